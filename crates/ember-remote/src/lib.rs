//! Remote collaborators for Ember.
//!
//! Neither service is authoritative: the memory store is a searchable
//! mirror of local records and the deploy hook only asks the public site to
//! rebuild. Callers treat every failure here as non-fatal.

mod deploy;
mod error;
mod memory;

pub use deploy::{DeployResponse, DeployTransport, DeployTrigger, Deployer, HttpDeployTransport};
pub use error::RemoteError;
pub use memory::{
    DisabledMemory, FilterOp, MemoryClient, MemoryFilter, MemoryHit, MemoryMetadata, MemoryStore,
};
