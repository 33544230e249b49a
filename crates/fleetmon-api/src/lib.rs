#![forbid(unsafe_code)]

//! Public HTTP API contract for the fleetmon service: stable error codes,
//! request/response bodies, and query-parameter parsing. Kept free of any
//! server-framework types so the CLI and tests can share it.

mod dto;
mod errors;
mod params;

pub use dto::{
    BuildState, BuildStatusResponse, DeviceGroupUpsertRequest, DeviceUpsertRequest,
    RuleUpsertRequest, VersionResponse,
};
pub use errors::{status_for_code, ApiError, ApiErrorCode};
pub use params::{parse_list_params, ListParams, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};

pub const CRATE_NAME: &str = "fleetmon-api";
