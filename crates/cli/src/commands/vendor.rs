//! Vendor management commands.
//!
//! # Usage
//!
//! ```bash
//! campus-cli vendor create -n "North Canteen" -l "Block A"
//! campus-cli vendor list
//! ```

use campus_server::db::{RepositoryError, VendorRepository, create_pool};

use super::{CommandError, database_url};

/// Register a new vendor.
///
/// # Errors
///
/// Returns `CommandError::InvalidArgument` for a blank name or a name that
/// is already taken.
pub async fn create(name: &str, location: Option<&str>) -> Result<(), CommandError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CommandError::InvalidArgument(
            "vendor name must not be blank".to_string(),
        ));
    }
    let location = location.map(str::trim).filter(|l| !l.is_empty());

    let pool = create_pool(&database_url()?).await?;
    let vendor = match VendorRepository::new(&pool).create(name, location).await {
        Ok(vendor) => vendor,
        Err(RepositoryError::Conflict(_)) => {
            return Err(CommandError::InvalidArgument(format!(
                "a vendor named {name:?} already exists"
            )));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(vendor_id = %vendor.id, name = %vendor.name, "Vendor created");
    Ok(())
}

/// Print every vendor, one per line.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable.
pub async fn list() -> Result<(), CommandError> {
    let pool = create_pool(&database_url()?).await?;
    let vendors = VendorRepository::new(&pool).list().await?;

    #[allow(clippy::print_stdout)]
    {
        for vendor in &vendors {
            let status = if vendor.is_active { "active" } else { "inactive" };
            println!(
                "{}  {}  {}  {status}",
                vendor.id,
                vendor.name,
                vendor.location.as_deref().unwrap_or("-")
            );
        }
    }

    tracing::info!(count = vendors.len(), "Vendors listed");
    Ok(())
}
