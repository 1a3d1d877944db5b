use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use ssewire::protocol::DEFAULT_MAX_FRAME_SIZE;
use ssewire::transport::server::{ServerConfig, DEFAULT_PIPE_CAPACITY, DEFAULT_PORT};
use ssewire::{DeferPolicy, EmitterConfig, KeyValueSource, DEFAULT_MAX_PENDING};

/// ssewire: periodic SSE emitter and fragmentation-tolerant reader
#[derive(Parser, Debug)]
#[command(name = "ssewire")]
#[command(about = "Serve or watch a Server-Sent Events stream", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse CLI arguments from the environment
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve a periodic payload stream at /sse (GET and POST)
    Serve(ServeArgs),
    /// Connect to an SSE endpoint and print each payload received
    Watch(WatchArgs),
}

/// What the emitter keeps while a client is not reading
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferMode {
    /// Only the newest frame
    Latest,
    /// Up to --defer-capacity frames, oldest dropped first
    Bounded,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to bind the HTTP server to
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Milliseconds between payloads
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,

    /// Entries in each generated payload
    #[arg(long, default_value_t = KeyValueSource::DEFAULT_SIZE)]
    pub payload_size: usize,

    /// Frames queued on a connection before it counts as full
    #[arg(long, default_value_t = DEFAULT_MAX_PENDING)]
    pub max_pending: usize,

    /// Defer policy while a connection is full
    #[arg(long, value_enum, default_value_t = DeferMode::Latest)]
    pub defer: DeferMode,

    /// Frames held with --defer bounded
    #[arg(long, default_value_t = 8)]
    pub defer_capacity: usize,
}

impl ServeArgs {
    pub fn defer_policy(&self) -> DeferPolicy {
        match self.defer {
            DeferMode::Latest => DeferPolicy::KeepLatest,
            DeferMode::Bounded => DeferPolicy::Bounded(self.defer_capacity),
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            port: self.port,
            payload_size: self.payload_size,
            emitter: EmitterConfig {
                interval: Duration::from_millis(self.interval_ms.max(1)),
                max_pending_frames: self.max_pending,
                defer_policy: self.defer_policy(),
            },
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        }
    }
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Endpoint to subscribe to
    #[arg(long, default_value = "http://127.0.0.1:3000/sse")]
    pub url: String,

    /// HTTP method for the request
    #[arg(long, value_enum, default_value_t = HttpMethod::Post)]
    pub method: HttpMethod,

    /// Stop after this many payloads
    #[arg(long)]
    pub limit: Option<usize>,

    /// Largest frame accepted, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["ssewire", "serve"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.port, 3000);
        assert_eq!(args.interval_ms, 1000);
        assert_eq!(args.payload_size, 100_000);
        assert_eq!(args.max_pending, 16);
        assert_eq!(args.defer_policy(), DeferPolicy::KeepLatest);

        let config = args.server_config();
        assert_eq!(config.emitter.interval, Duration::from_secs(1));
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::try_parse_from([
            "ssewire",
            "serve",
            "--port",
            "8080",
            "--interval-ms",
            "250",
            "--payload-size",
            "10",
            "--defer",
            "bounded",
            "--defer-capacity",
            "4",
        ])
        .unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };

        let config = args.server_config();
        assert_eq!(config.port, 8080);
        assert_eq!(config.payload_size, 10);
        assert_eq!(config.emitter.interval, Duration::from_millis(250));
        assert_eq!(config.emitter.defer_policy, DeferPolicy::Bounded(4));
    }

    #[test]
    fn test_watch_defaults() {
        let cli = Cli::try_parse_from(["ssewire", "watch"]).unwrap();
        let Command::Watch(args) = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(args.url, "http://127.0.0.1:3000/sse");
        assert_eq!(args.method, HttpMethod::Post);
        assert_eq!(args.limit, None);
        assert_eq!(args.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn test_watch_method_and_limit() {
        let cli =
            Cli::try_parse_from(["ssewire", "watch", "--method", "get", "--limit", "3"]).unwrap();
        let Command::Watch(args) = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(reqwest::Method::from(args.method), reqwest::Method::GET);
        assert_eq!(args.limit, Some(3));
    }

    #[test]
    fn test_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["ssewire"]).is_err());
    }
}
