//! Live application settings backed by a remote key-value store.
//!
//! A [`Dynconf`] handle keeps a process-local cache of every setting under
//! one path prefix (e.g. `/configs/curiosity/`) and keeps it fresh through
//! a prefix watch, reconnecting with a fixed backoff when the watch is
//! lost. Typed getters read the cache only and fall back to the caller's
//! default when a setting is absent or malformed.
//!
//! ```ignore
//! let settings = Dynconf::builder("/configs/curiosity/").build().await?;
//! if settings.get_boolean("is_camera_enabled", false) {
//!     let fps = settings.get_integer("camera_fps", 30);
//! }
//! settings.close().await;
//! ```

mod accessor;
mod builder;
mod cache;
mod codec;
mod config;
mod constants;
mod dynconf;
mod errors;
mod store;
mod sync;
mod utils;

#[cfg(feature = "etcd")]
mod proto;

pub use accessor::*;
pub use builder::*;
pub use cache::*;
pub use codec::*;
pub use config::*;
pub use dynconf::*;
pub use errors::*;
pub use store::*;
pub use sync::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
mod test_utils;

#[cfg(test)]
mod cache_test;
