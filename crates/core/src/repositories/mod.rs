//! Record services.
//!
//! Each service owns handles to the collections it reads and writes; none of them hold
//! any other state, so they are cheap to clone into request handlers.

pub mod medications;
pub mod patients;
