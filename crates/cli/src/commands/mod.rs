pub mod check;
pub mod default;
pub mod disks;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Command {
    /// List configured backup disks
    Disks,
    /// Show or set the default backup disk
    Default(default::DefaultArgs),
    /// Resolve a backup disk and optionally probe it
    Check(check::CheckArgs),
}
