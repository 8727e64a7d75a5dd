//! Kernel namespace resolution.
//!
//! Every process exposes its namespaces as symbolic links under `/proc/<pid>/ns/`. The
//! link target encodes the namespace id as `<kind>:[<inode>]`, e.g. `pid:[4026531836]`.
//! Containers are identified by their pid namespace, so only the `pid` kind is resolved
//! by the tracker, although [`NamespaceResolver::resolve_kind`] accepts any kind.
mod error;
mod resolver;

pub use error::{Error, Result};
pub use resolver::{NamespaceID, NamespaceResolver, parse_namespace_link};
