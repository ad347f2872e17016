//! Resolution of path specification chains into usable stream handlers.
//!
//! The resolver walks a chain outermost-in: it dispatches each hop to the
//! matching format handler, opens it with the previous hop's handler as its
//! byte source, and returns the innermost handler as the resolved file.
//! Dispatch is a closed match over [`HopType`]; supporting a new format
//! means adding a variant and an arm here, nothing is registered at runtime.

use crate::error::{NestfileError, Result};
use crate::handler::{
    Bzip2StreamHandler, GzipStreamHandler, PlainFileHandler, SnapshotFileHandler,
    StreamHandler, TarMemberHandler, VolumeFileHandler, ZipMemberHandler,
};
use crate::spec::{HopType, PathSpec};
use crate::volume::cache::FilesystemCache;

/// Hard ceiling on chain depth. Evidence rarely nests more than a handful of
/// containers; anything deeper is a malformed or adversarial specification.
pub const MAX_CHAIN_DEPTH: usize = 64;

/// Walks specification chains and opens handlers against the shared
/// filesystem handle cache.
pub struct Resolver {
    cache: FilesystemCache,
}

impl Resolver {
    /// Create a resolver whose volume hops open through `cache`.
    pub fn new(cache: FilesystemCache) -> Self {
        Self { cache }
    }

    /// The filesystem handle cache backing volume and snapshot hops.
    pub fn cache(&self) -> &FilesystemCache {
        &self.cache
    }

    /// Resolve a specification chain to its innermost stream handler.
    ///
    /// Opens hop by hop, feeding each newly opened handler to the next hop
    /// inward as its byte source. Any open failure aborts the whole chain,
    /// wrapped with the failing hop's handler kind and member path.
    pub fn resolve(&self, spec: &PathSpec) -> Result<Box<dyn StreamHandler>> {
        // Reject pathological chains before opening anything.
        if spec.depth() > MAX_CHAIN_DEPTH {
            return Err(NestfileError::MaxDepthExceeded {
                max_depth: MAX_CHAIN_DEPTH,
            });
        }

        let mut current = spec;
        let mut upstream: Option<Box<dyn StreamHandler>> = None;

        loop {
            let handler = self
                .open_hop(current, upstream)
                .map_err(|e| NestfileError::Resolve {
                    handler: current.hop_type.name(),
                    member_path: current.member_path.clone(),
                    source: Box::new(e),
                })?;

            match current.nested.as_deref() {
                Some(nested) => {
                    upstream = Some(handler);
                    current = nested;
                }
                None => {
                    log::debug!(
                        "Opening file: {} [{}]",
                        handler.display_name(),
                        current.hop_type
                    );
                    return Ok(handler);
                }
            }
        }
    }

    fn open_hop(
        &self,
        spec: &PathSpec,
        upstream: Option<Box<dyn StreamHandler>>,
    ) -> Result<Box<dyn StreamHandler>> {
        Ok(match spec.hop_type {
            HopType::Plain => Box::new(PlainFileHandler::open(spec, upstream)?),
            HopType::Volume => Box::new(VolumeFileHandler::open(spec, upstream, &self.cache)?),
            HopType::Snapshot => Box::new(SnapshotFileHandler::open(spec, upstream, &self.cache)?),
            HopType::Zip => Box::new(ZipMemberHandler::open(spec, upstream)?),
            HopType::Gzip => Box::new(GzipStreamHandler::open(spec, upstream)?),
            HopType::Bzip2 => Box::new(Bzip2StreamHandler::open(spec, upstream)?),
            HopType::Tar => Box::new(TarMemberHandler::open(spec, upstream)?),
        })
    }
}
