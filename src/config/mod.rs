use config::{Config, ConfigError};
use once_cell::sync::Lazy;
use serde::Deserialize;

/// names of the three POSIX message queues shared by the daemon, the
/// filesystem adapter and the command-line client
#[derive(Deserialize, Clone)]
pub struct QueueConfig {
    pub manager: String,
    pub fuse: String,
    pub query: String,
}

#[derive(Deserialize, Clone)]
pub struct HandshakeConfig {
    /// bound on the initial ping; all requests after the handshake block
    #[serde(rename = "timeoutmillis")]
    pub timeout_millis: u64,
}

/// config properties for the whole of this application
#[derive(Deserialize, Clone)]
pub struct TaggableFsConfig {
    pub queues: QueueConfig,
    pub handshake: HandshakeConfig,
}

/// Parses the config file located at ./TaggableFS.toml, if it exists.
/// If this fails to parse the file, the application will panic
pub fn parse_config() -> TaggableFsConfig {
    let builder = Config::builder()
        .add_source(config::File::with_name("./TaggableFS.toml"))
        .build();
    // some errors are fine, such as not found
    if let Err(ConfigError::Foreign(e)) = builder {
        let message = e.to_string();
        if message.contains("not found") {
            log::warn!("No config file found. Continuing startup...");
            return TFS_CONFIG_DEFAULT.clone();
        }
        panic!("Failed to parse config file. Exception is {e}");
        // basically everything else is unrecoverable, though
    } else if let Err(e) = builder {
        log::error!("Failed to parse config file. Exception is {e}");
        panic!("Failed to parse config file. Exception is {e}");
    }
    let settings = builder.unwrap();
    settings
        .try_deserialize()
        .unwrap_or(TFS_CONFIG_DEFAULT.clone())
}

/// global variable for config, that way it doesn't need to be repeatedly parsed
pub static TAGGABLE_FS_CONFIG: Lazy<TaggableFsConfig> = Lazy::new(parse_config);
static TFS_CONFIG_DEFAULT: Lazy<TaggableFsConfig> = Lazy::new(|| TaggableFsConfig {
    queues: QueueConfig {
        manager: "/tfs_managermq".to_string(),
        fuse: "/tfs_fusemq".to_string(),
        query: "/tfs_querymq".to_string(),
    },
    handshake: HandshakeConfig {
        timeout_millis: 1_000,
    },
});
