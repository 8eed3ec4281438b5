use moon_client::CommentLimits;
use moon_types::{is_empty_html, CreateCommentData, RangeLimit, ValidationError};

/// Media timestamps are seconds into the attachment, capped at a day.
pub const TIMESTAMP_LIMIT: RangeLimit<f64> = RangeLimit::new(0.0, 86_400.0);

/// Checks composer input before anything is cached or sent.
pub fn validate_comment(
    data: &CreateCommentData,
    limits: &CommentLimits,
) -> Result<(), ValidationError> {
    if is_empty_html(&data.body_html) && data.transformed_files.is_empty() {
        return Err(ValidationError::Empty("body_html"));
    }
    if data.body_html.chars().count() > limits.max_body_chars {
        return Err(ValidationError::TooLong {
            field: "body_html",
            max: limits.max_body_chars,
        });
    }
    RangeLimit::new(0, limits.max_attachments)
        .check("attachments", data.transformed_files.len())?;
    if let Some(timestamp) = data.timestamp {
        if !timestamp.is_finite() {
            return Err(ValidationError::OutOfRange {
                field: "timestamp",
                min: TIMESTAMP_LIMIT.min.to_string(),
                max: TIMESTAMP_LIMIT.max.to_string(),
                value: timestamp.to_string(),
            });
        }
        TIMESTAMP_LIMIT.check("timestamp", timestamp)?;
    }
    Ok(())
}
