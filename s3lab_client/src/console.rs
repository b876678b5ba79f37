//! Links into the AWS management console and public object URLs
use std::fmt::Display;

/// Region assumed when the store has none configured
pub const DEFAULT_REGION: &str = "us-east-1";

const CONSOLE: &str = "https://s3.console.aws.amazon.com/s3";

/// A tab of the console's bucket or object page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Properties,
    Permissions,
    Versions,
}

impl Display for Tab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Properties => "properties",
            Self::Permissions => "permissions",
            Self::Versions => "versions",
        })
    }
}

fn region(region: Option<&str>) -> &str {
    region.unwrap_or(DEFAULT_REGION)
}

fn with_tab(url: String, tab: Option<Tab>) -> String {
    match tab {
        Some(tab) => format!("{url}&tab={tab}"),
        None => url,
    }
}

/// The console page listing every bucket
pub fn buckets_link(region_name: Option<&str>) -> String {
    format!("{CONSOLE}/buckets?region={}", region(region_name))
}

pub fn bucket_link(bucket: &str, region_name: Option<&str>, tab: Option<Tab>) -> String {
    with_tab(
        format!("{CONSOLE}/buckets/{bucket}?region={}", region(region_name)),
        tab,
    )
}

pub fn object_link(bucket: &str, key: &str, region_name: Option<&str>, tab: Option<Tab>) -> String {
    with_tab(
        format!(
            "{CONSOLE}/object/{bucket}?region={}&prefix={}",
            region(region_name),
            urlencoding::encode(key)
        ),
        tab,
    )
}

/// Virtual-hosted style URL anonymous readers use for a public object
pub fn public_object_url(bucket: &str, key: &str, region_name: Option<&str>) -> String {
    format!(
        "https://{bucket}.s3.{}.amazonaws.com/{}",
        region(region_name),
        urlencoding::encode(key)
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn links() {
        assert_eq!(
            buckets_link(None),
            "https://s3.console.aws.amazon.com/s3/buckets?region=us-east-1"
        );
        assert_eq!(
            bucket_link("b1", Some("eu-west-1"), Some(Tab::Properties)),
            "https://s3.console.aws.amazon.com/s3/buckets/b1?region=eu-west-1&tab=properties"
        );
        assert_eq!(
            object_link("b1", "a file.txt", Some("eu-west-1"), Some(Tab::Versions)),
            "https://s3.console.aws.amazon.com/s3/object/b1?region=eu-west-1&prefix=a%20file.txt&tab=versions"
        );
        assert_eq!(
            public_object_url("b1", "x.txt", None),
            "https://b1.s3.us-east-1.amazonaws.com/x.txt"
        );
    }
}
