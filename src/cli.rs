use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pix-by-date")]
#[command(
    about = "Move pictures (or other files) into directories named by the date they were taken"
)]
pub struct Args {
    /// Directory to search recursively
    #[arg(short = 's', long = "search", visible_alias = "src", default_value = ".")]
    pub search: PathBuf,

    /// Directory where the date folders will be created
    #[arg(short = 'o', long = "outdir", visible_alias = "dst", default_value = "Moved")]
    pub outdir: PathBuf,

    /// Comma-separated list of file suffixes to include (case-insensitive).
    /// Empty entries are ignored, so an empty list matches no files
    #[arg(short, long, default_value = "jpg,mp4,mov,avi,wmv,png")]
    pub extensions: String,

    /// Show what would be done without moving any files
    #[arg(short, long, default_value_t = false)]
    pub dry_run: bool,

    /// Log every directory creation and move
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// What to do when a file with the same name already exists at the destination
    #[arg(long, value_enum, default_value_t = CollisionPolicy::Rename)]
    pub on_collision: CollisionPolicy,

    /// Leave colliding files in place (same as --on-collision skip)
    #[arg(long, default_value_t = false, conflicts_with = "on_collision")]
    pub skip_replace: bool,
}

impl Args {
    pub fn collision_policy(&self) -> CollisionPolicy {
        if self.skip_replace {
            CollisionPolicy::Skip
        } else {
            self.on_collision
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// Leave the source file where it is
    Skip,
    /// Move it under a name derived from the sha1 of its source path
    Rename,
}
