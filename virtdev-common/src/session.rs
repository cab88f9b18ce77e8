use zenoh::Session;

use crate::config::ZenohConfig;
use crate::error::{Error, Result};

/// Translate [`ZenohConfig`] into a native Zenoh configuration.
pub fn zenoh_config(config: &ZenohConfig) -> Result<zenoh::Config> {
    let mut native = zenoh::Config::default();
    insert(&mut native, "mode", format!("\"{}\"", config.mode))?;

    for (field, endpoints) in [("connect", &config.connect), ("listen", &config.listen)] {
        if !endpoints.is_empty() {
            insert(
                &mut native,
                &format!("{}/endpoints", field),
                serde_json::to_string(endpoints)?,
            )?;
        }
    }
    Ok(native)
}

fn insert(native: &mut zenoh::Config, field: &str, json: String) -> Result<()> {
    native
        .insert_json5(field, &json)
        .map_err(|e| Error::ZenohSetting {
            field: field.to_string(),
            message: e.to_string(),
        })
}

/// Open the object bus session.
pub async fn connect(config: &ZenohConfig) -> Result<Session> {
    let native = zenoh_config(config)?;

    tracing::info!(
        mode = %config.mode,
        connect = ?config.connect,
        listen = ?config.listen,
        "Opening object bus session"
    );
    let session = zenoh::open(native).await?;
    tracing::info!(zid = %session.zid(), "Object bus session open");

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZenohMode;

    #[test]
    fn test_default_peer_config() {
        assert!(zenoh_config(&ZenohConfig::default()).is_ok());
    }

    #[test]
    fn test_client_with_endpoints() {
        let config = ZenohConfig {
            mode: ZenohMode::Client,
            connect: vec!["tcp/127.0.0.1:7447".to_string()],
            listen: Vec::new(),
        };
        assert!(zenoh_config(&config).is_ok());
    }
}
