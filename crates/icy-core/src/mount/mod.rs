//! Mount state: configuration, live source/listener bookkeeping, and ICY metadata.

mod meta;
mod mount;

pub use meta::{decode_song_text, MetaBlock};
pub use mount::{AuthOutcome, Credentials, Mount, MountInfo};
