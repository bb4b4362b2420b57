use anyhow::Context;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub body_limit_bytes: usize,
}

impl ServerConfig {
    /// Reads `KOMA__SERVER__PORT` and `KOMA__SERVER__BODY_LIMIT_BYTES`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = match get("KOMA__SERVER__PORT") {
            Some(v) => v.parse().with_context(|| format!("KOMA__SERVER__PORT={v}"))?,
            None => DEFAULT_PORT,
        };
        let body_limit_bytes = match get("KOMA__SERVER__BODY_LIMIT_BYTES") {
            Some(v) => v
                .parse()
                .with_context(|| format!("KOMA__SERVER__BODY_LIMIT_BYTES={v}"))?,
            None => DEFAULT_BODY_LIMIT,
        };
        Ok(Self {
            port,
            body_limit_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let cfg = ServerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.body_limit_bytes, 2 * 1024 * 1024);

        let cfg = ServerConfig::from_lookup(|k| (k == "KOMA__SERVER__PORT").then(|| "9000".to_string())).unwrap();
        assert_eq!(cfg.port, 9000);

        let err = ServerConfig::from_lookup(|_| Some("lots".into())).unwrap_err();
        assert!(err.to_string().contains("KOMA__SERVER__PORT"));
    }
}
