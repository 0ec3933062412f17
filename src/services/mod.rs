//! Service layer: the control plane that serializes every mutation and
//! publishes a snapshot after each one.

pub mod control_plane;

pub use control_plane::{ControlPlane, MutationOutcome};
