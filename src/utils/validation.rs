use crate::error::UploadError;
use crate::models::Asset;

/// Maximum asset size: 10 MiB
pub const MAX_ASSET_SIZE: u64 = 10 * 1024 * 1024; // 10 MiB

/// Media type prefix accepted for images
pub const IMAGE_MEDIA_PREFIX: &str = "image/";

/// Extensions accepted even when the declared type is not an image type.
/// Browsers report an empty type for `.jfif` files.
pub const SPECIAL_EXTENSIONS: &[&str] = &["jfif"];

/// Validates asset size against the fixed ceiling
pub fn validate_asset_size(size: u64) -> Result<(), UploadError> {
    if size > MAX_ASSET_SIZE {
        return Err(UploadError::TooLarge {
            size,
            max: MAX_ASSET_SIZE,
        });
    }
    Ok(())
}

/// Validates the declared media type, allowing the special extensions through
pub fn validate_asset_type(declared_type: &str, original_name: &str) -> Result<(), UploadError> {
    let normalized = declared_type.trim().to_lowercase();
    if normalized.starts_with(IMAGE_MEDIA_PREFIX) || has_special_extension(original_name) {
        return Ok(());
    }

    Err(UploadError::InvalidType(format!(
        "'{}' ({}) is not an image",
        original_name,
        if declared_type.is_empty() {
            "unknown type"
        } else {
            declared_type
        }
    )))
}

fn has_special_extension(name: &str) -> bool {
    let lower = name.to_lowercase();
    SPECIAL_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{}", ext)))
}

/// Full acceptance check for a selected asset. Size is checked first so an
/// oversized asset is rejected regardless of its type.
pub fn validate_asset(asset: &Asset) -> Result<(), UploadError> {
    validate_asset_size(asset.size_bytes())?;
    validate_asset_type(asset.declared_type(), asset.original_name())?;
    Ok(())
}
