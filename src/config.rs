use clap::Parser;

use crate::codec::DEFAULT_MAX_FRAME_SIZE;

const BIND: &str = "127.0.0.1";
const PORT: u16 = 6379;

/// Process configuration, read from the command line and the environment at startup.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "zedis", version, about)]
pub struct Config {
    /// The address to listen on
    #[arg(short, long, default_value = BIND)]
    pub bind: String,

    /// The port to listen on
    #[arg(short, long, default_value_t = PORT)]
    pub port: u16,

    /// Largest request, in bytes, a connection may buffer before it is dropped
    #[arg(long, env = "ZEDIS_MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: BIND.to_string(),
            port: PORT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["zedis"]).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn flags() {
        let config =
            Config::try_parse_from(["zedis", "--bind", "0.0.0.0", "-p", "7000"]).unwrap();

        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 7000);
    }

    #[test]
    fn rejects_invalid_port() {
        assert!(Config::try_parse_from(["zedis", "--port", "nope"]).is_err());
    }
}
