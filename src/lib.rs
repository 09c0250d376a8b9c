//! Client glue of the Gravitalia account front-end: the session store
//! holding the connected user, and the offline cache worker.

pub mod config;
pub mod db;
pub mod error;
pub mod session;
pub mod telemetry;
pub mod worker;
