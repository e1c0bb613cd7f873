//! Black-box behavioral specifications, run against the compiled binaries.

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/cli/help.rs"]
mod cli_help;
#[path = "specs/cli/errors.rs"]
mod cli_errors;

#[path = "specs/daemon/lifecycle.rs"]
mod daemon_lifecycle;

#[path = "specs/admin/status.rs"]
mod admin_status;
#[path = "specs/admin/ledger.rs"]
mod admin_ledger;
#[path = "specs/admin/pool.rs"]
mod admin_pool;
#[path = "specs/admin/reap.rs"]
mod admin_reap;
