use std::path::Path;

use crate::api::model_dto::SystemModelDto;
use crate::domain::directory::Directory;
use crate::error::Result;
use crate::loader::parser::parse_json_file;

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

/// Parses a system model file and builds the directory from it.
///
/// Returns the directory together with the bookings listed in the file,
/// which the caller may feed to the admission scheduler.
pub fn load_system_model(file_path: impl AsRef<Path>) -> Result<(Directory, SystemModelDto)> {
    let dto: SystemModelDto = parse_json_file(file_path)?;
    log::info!(
        "System model parsed: {} node(s), {} user(s), {} booking(s).",
        dto.nodes.len(),
        dto.users.len(),
        dto.bookings.len()
    );

    let directory = Directory::from_dto(&dto)?;
    Ok((directory, dto))
}
