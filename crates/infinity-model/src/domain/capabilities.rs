use serde::Deserialize;

/// Static self-description of the worker binary, captured once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    raw: String,
    version: Option<String>,
}

#[derive(Deserialize)]
struct Components {
    buildinfo: BuildInfo,
}

#[derive(Deserialize)]
struct BuildInfo {
    #[serde(default)]
    version: Option<String>,
}

impl Capabilities {
    /// Keep the `components` output verbatim and pull `buildinfo.version` out of it when possible.
    pub fn from_raw(raw: impl AsRef<[u8]>) -> Self {
        let raw = String::from_utf8_lossy(raw.as_ref()).into_owned();
        let version = serde_yaml::from_str::<Components>(&raw)
            .ok()
            .and_then(|doc| doc.buildinfo.version)
            .filter(|v| !v.trim().is_empty());

        Self { raw, version }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Worker build version, `None` when the descriptor could not be parsed.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// The descriptor re-encoded as a JSON value.
    pub fn descriptor(&self) -> Result<serde_json::Value, serde_yaml::Error> {
        serde_yaml::from_str(&self.raw)
    }
}
