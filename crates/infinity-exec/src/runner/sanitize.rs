use std::sync::LazyLock;

use infinity_model::WORKER_NAME;
use regex::Regex;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9:(), ]+").expect("static pattern compiles"));

/// Drop everything but ASCII alphanumerics and `:(), `.
pub fn sanitize(line: &str) -> String {
    UNSAFE_CHARS.replace_all(line, "").into_owned()
}

/// A worker line as reported to API callers: `otelcol-contrib - <sanitized line>`.
pub fn worker_report(line: &str) -> String {
    format!("{WORKER_NAME} - {}", sanitize(line))
}
