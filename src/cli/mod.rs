// Keygate — CLI Module
//
// Command-line interface using clap derive macros.
// Subcommands cover the provider's inspection and erase surface:
// find, empty, content, prototype, owner, provider-uid, referring, clear.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::model::SlotNumber;

pub use commands::execute;

/// Keygate — inspect and manage remote key slots over the daemon socket.
#[derive(Parser, Debug)]
#[command(name = "keygate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the daemon socket (defaults to the runtime directory).
    #[arg(long)]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Locate the slot holding an object by its identity.
    Find {
        /// Generator UUID of the object.
        #[arg(long)]
        generator: String,

        /// Version stamp of the object.
        #[arg(long, default_value = "0")]
        version: u64,
    },

    /// Check whether a slot currently holds an object.
    Empty {
        /// The slot number to query.
        slot: SlotNumber,
    },

    /// Show the content properties of a non-empty slot.
    Content { slot: SlotNumber },

    /// Show the prototype properties of a slot.
    Prototype { slot: SlotNumber },

    /// Show the owner actor of a slot.
    Owner { slot: SlotNumber },

    /// Show the default crypto provider bound to a slot.
    ProviderUid { slot: SlotNumber },

    /// List the slots whose stored object references the given slot.
    Referring { slot: SlotNumber },

    /// Securely and irreversibly erase a slot's content.
    Clear { slot: SlotNumber },
}

// ─── Tests ───────────────────────────────────────────────────────────────────
