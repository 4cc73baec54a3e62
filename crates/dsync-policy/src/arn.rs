//! ARN formatting helpers

/// ARN of an S3 bucket
#[inline]
#[must_use]
pub fn bucket_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{bucket}")
}

/// ARN matching every object in an S3 bucket
#[inline]
#[must_use]
pub fn bucket_objects_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{bucket}/*")
}

/// ARN of an IAM role in `account`
#[inline]
#[must_use]
pub fn role_arn(account: &str, role_name: &str) -> String {
    format!("arn:aws:iam::{account}:role/{role_name}")
}

/// Pattern matching any DataSync resource in `region` owned by `account`
#[inline]
#[must_use]
pub fn datasync_resource_pattern(region: &str, account: &str) -> String {
    format!("arn:aws:datasync:{region}:{account}:*")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats() {
        assert_eq!(bucket_arn("b"), "arn:aws:s3:::b");
        assert_eq!(bucket_objects_arn("b"), "arn:aws:s3:::b/*");
        assert_eq!(role_arn("123", "r"), "arn:aws:iam::123:role/r");
        assert_eq!(
            datasync_resource_pattern("eu-west-1", "123"),
            "arn:aws:datasync:eu-west-1:123:*"
        );
    }
}
