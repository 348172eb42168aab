//! Parsing of the `--config` TOML strings handed to servers and clients.

/// Starts from the type's `Default` and overwrites only the listed fields
/// found in the optional TOML string. Keys outside the list are rejected.
///
/// Example:
/// ```no_compile
/// let config = parsed_config!(config_str => ServerConfig;
///                             heartbeat_interval_ms, watchdog_tick_ms)?;
/// ```
#[macro_export]
macro_rules! parsed_config {
    ($config_str:expr => $config_type:ty; $($field:ident),+) => {{
        let config_str: Option<&str> = $config_str;

        // closure helper for easier error returning
        let compose_config = || -> Result<$config_type, $crate::GavelError> {
            let mut config: $config_type = Default::default();
            let config_str = match config_str {
                None => return Ok(config),
                Some(s) => s,
            };

            let mut table = config_str.parse::<toml::Table>()?;

            // traverse through all given field names
            $({
                // if field name found in table (and removed)
                if let Some(v) = table.remove(stringify!($field)) {
                    config.$field = v.try_into()?;
                }
            })+

            // if table is not empty at this time, some parsed keys are not
            // expected hence invalid
            if let Some(key) = table.keys().next() {
                return Err($crate::GavelError(format!(
                    "invalid field name '{}' in config",
                    key,
                )));
            }

            Ok(config)
        };

        compose_config()
    }};
}

#[cfg(test)]
mod config_tests {
    use crate::utils::GavelError;

    #[derive(Debug, PartialEq)]
    struct KnobsConfig {
        interval_ms: u64,
        backup_addr: String,
        rollback: bool,
    }

    impl Default for KnobsConfig {
        fn default() -> Self {
            KnobsConfig {
                interval_ms: 500,
                backup_addr: "127.0.0.1:50052".into(),
                rollback: false,
            }
        }
    }

    #[test]
    fn absent_string_gives_defaults() -> Result<(), GavelError> {
        let config =
            parsed_config!(None => KnobsConfig; interval_ms, backup_addr)?;
        assert_eq!(config, KnobsConfig::default());
        Ok(())
    }

    #[test]
    fn overrides_listed_fields() -> Result<(), GavelError> {
        let config_str = Some("interval_ms = 50\nrollback = true");
        let config =
            parsed_config!(config_str => KnobsConfig; interval_ms, rollback)?;
        assert_eq!(
            config,
            KnobsConfig {
                interval_ms: 50,
                backup_addr: "127.0.0.1:50052".into(),
                rollback: true,
            }
        );
        Ok(())
    }

    #[test]
    fn unlisted_field_rejected() {
        let config_str = Some("backup_addr = '10.0.0.2:50052'");
        assert!(parsed_config!(config_str => KnobsConfig; interval_ms).is_err());
    }

    #[test]
    fn mistyped_value_rejected() {
        let config_str = Some("rollback = 'yes'");
        assert!(parsed_config!(config_str => KnobsConfig; rollback).is_err());
    }
}
