use clap::{Parser, Subcommand};

/// notifyd: realtime notification channel for recruiter workspaces
#[derive(Parser)]
#[command(name = "notifyd", version, about)]
pub struct Cli {
    /// Company (tenant) id; falls back to NOTIFY_COMPANY_ID
    #[arg(short, long, global = true)]
    pub company: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the realtime server and stream notifications until Ctrl-C
    Listen,

    /// Print the locally stored notifications
    List {
        /// Only show unread notifications
        #[arg(long)]
        unread: bool,
    },

    /// Load notifications from the REST backlog
    Fetch {
        /// Append the next older page instead of reloading the first one
        #[arg(long)]
        more: bool,
    },

    /// Mark one notification as read
    MarkRead { id: String },

    /// Mark every notification as read
    MarkAllRead,

    /// Delete one notification
    Remove { id: String },

    /// Delete all notifications and reset pagination
    Clear,

    /// Send a test message over the realtime channel and wait for the echo
    Echo {
        message: String,
        /// Seconds to wait for the echo
        #[arg(long, default_value = "5")]
        timeout: u64,
    },
}
