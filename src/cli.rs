use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "shelf", about = "Offline-first sync core for a digital library storefront")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch a user's library, falling back to the local cache when offline
    Library {
        /// User identifier
        user_id: String,

        /// Emit records as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Replay queued offline mutations against the backend
    Sync,

    /// Redeem an access code for a gated book
    Redeem {
        user_id: String,
        book_id: String,
        code: String,
    },

    /// Report how many bytes of a book's file are downloaded locally
    Size {
        book_id: String,
    },

    /// Run the network interception worker until interrupted
    Serve,
}
