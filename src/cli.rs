use clap::{Parser, Subcommand};

/// Live Markdown preview in the browser.
///
/// remark watches every file matching the given glob patterns and re-renders
/// the one you are viewing each time it changes on disk.
#[derive(Parser, Debug)]
#[command(
    name = "remark",
    version,
    about,
    long_about = None,
    propagate_version = true,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve live previews of every matching file.
    Serve {
        /// Port to run the server on [config: port, default: 8888].
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind to [config: host, default: 127.0.0.1].
        #[arg(long)]
        host: Option<String>,

        /// Glob patterns of files to watch; several may be given separated by
        /// whitespace or by repeating the flag [config: patterns, default: **/*.md].
        #[arg(short = 'w', long = "watch", value_name = "PATTERNS")]
        watch: Vec<String>,

        /// Milliseconds between glob re-resolution passes [config: interval_ms, default: 10].
        #[arg(long, value_name = "MS")]
        interval_ms: Option<u64>,

        /// Log session and watcher activity at debug level.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Resolve the patterns once and print the files that would be watched.
    List {
        /// Glob patterns of files to match (same syntax as `serve --watch`).
        #[arg(short = 'w', long = "watch", value_name = "PATTERNS")]
        watch: Vec<String>,

        /// Output results as a JSON array instead of one path per line.
        #[arg(long)]
        json: bool,
    },
}
