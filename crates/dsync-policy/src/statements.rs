//! Canonical documents and statements installed by the tool
//!
//! - Trust policy for the DataSync role (confused-deputy protected)
//! - Inline permission policy: read on source buckets, read-write on
//!   destination buckets gated on the destination account
//! - The two bucket policy statements granting the role access

use crate::arn::{bucket_arn, bucket_objects_arn, datasync_resource_pattern};
use crate::document::{Statement, POLICY_VERSION};
use crate::error::PolicyError;
use crate::merge::{BUCKET_ACCESS_SID, OBJECT_ACCESS_SID};
use serde_json::{json, Value};

/// Service principal allowed to assume the role
pub const DATASYNC_SERVICE_PRINCIPAL: &str = "datasync.amazonaws.com";

const BUCKET_READ_ACTIONS: &[&str] = &[
    "s3:GetBucketLocation",
    "s3:ListBucket",
    "s3:ListBucketMultipartUploads",
];

const SOURCE_OBJECT_ACTIONS: &[&str] = &[
    "s3:GetObject",
    "s3:GetObjectTagging",
    "s3:GetObjectVersion",
    "s3:GetObjectVersionTagging",
    "s3:ListMultipartUploadParts",
];

const DESTINATION_OBJECT_ACTIONS: &[&str] = &[
    "s3:AbortMultipartUpload",
    "s3:DeleteObject",
    "s3:GetObject",
    "s3:GetObjectTagging",
    "s3:PutObject",
    "s3:PutObjectTagging",
];

const BUCKET_POLICY_OBJECT_ACTIONS: &[&str] = &[
    "s3:AbortMultipartUpload",
    "s3:DeleteObject",
    "s3:GetObject",
    "s3:PutObject",
    "s3:PutObjectTagging",
    "s3:GetObjectTagging",
];

/// Trust policy letting DataSync in `account`/`region` assume the role
#[must_use]
pub fn trust_policy(account: &str, region: &str) -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": DATASYNC_SERVICE_PRINCIPAL },
            "Action": "sts:AssumeRole",
            "Condition": {
                "StringEquals": { "aws:SourceAccount": account },
                "ArnLike": { "aws:SourceArn": datasync_resource_pattern(region, account) },
            },
        }],
    })
}

/// Inline role policy covering every bucket of the run
///
/// Bucket lists are de-duplicated, keeping first occurrence order.
#[must_use]
pub fn permission_policy(
    source_buckets: &[String],
    destination_buckets: &[String],
    destination_account: &str,
) -> Value {
    let sources = distinct(source_buckets);
    let destinations = distinct(destination_buckets);
    let same_account = json!({ "StringEquals": { "aws:ResourceAccount": destination_account } });

    json!({
        "Version": POLICY_VERSION,
        "Statement": [
            {
                "Sid": "SourceBucketAccess",
                "Effect": "Allow",
                "Action": BUCKET_READ_ACTIONS,
                "Resource": sources.iter().map(|b| bucket_arn(b)).collect::<Vec<_>>(),
            },
            {
                "Sid": "SourceObjectAccess",
                "Effect": "Allow",
                "Action": SOURCE_OBJECT_ACTIONS,
                "Resource": sources.iter().map(|b| bucket_objects_arn(b)).collect::<Vec<_>>(),
            },
            {
                "Sid": "DestBucketAccess",
                "Effect": "Allow",
                "Action": BUCKET_READ_ACTIONS,
                "Resource": destinations.iter().map(|b| bucket_arn(b)).collect::<Vec<_>>(),
                "Condition": same_account,
            },
            {
                "Sid": "DestObjectAccess",
                "Effect": "Allow",
                "Action": DESTINATION_OBJECT_ACTIONS,
                "Resource": destinations.iter().map(|b| bucket_objects_arn(b)).collect::<Vec<_>>(),
                "Condition": same_account,
            },
        ],
    })
}

/// The two owned bucket policy statements for `bucket`, principal = `role_arn`
///
/// # Errors
/// Returns error only if serialization fails
pub fn bucket_access_statements(
    bucket: &str,
    role_arn: &str,
) -> Result<[Statement; 2], PolicyError> {
    let bucket_level = Statement::from_value(&json!({
        "Sid": BUCKET_ACCESS_SID,
        "Effect": "Allow",
        "Principal": { "AWS": role_arn },
        "Action": BUCKET_READ_ACTIONS,
        "Resource": bucket_arn(bucket),
    }))?;
    let object_level = Statement::from_value(&json!({
        "Sid": OBJECT_ACCESS_SID,
        "Effect": "Allow",
        "Principal": { "AWS": role_arn },
        "Action": BUCKET_POLICY_OBJECT_ACTIONS,
        "Resource": bucket_objects_arn(bucket),
    }))?;
    Ok([bucket_level, object_level])
}

fn distinct(buckets: &[String]) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::with_capacity(buckets.len());
    for bucket in buckets {
        if !out.contains(&bucket.as_str()) {
            out.push(bucket);
        }
    }
    out
}
