pub const APP_NAME: &str = "miepack";

/// Key prefix under which every artifact is published.
pub const SOLUTION_PREFIX: &str = "media_insights_engine";

/// Regions where every packaged operator can run.
///
/// One of the embedded object-detection dependencies is only available in
/// these regions, so the list is closed.
pub const SUPPORTED_REGIONS: [&str; 12] = [
  "us-east-1",
  "us-east-2",
  "us-west-1",
  "us-west-2",
  "eu-west-1",
  "eu-west-2",
  "eu-central-1",
  "ap-south-1",
  "ap-northeast-1",
  "ap-northeast-2",
  "ap-southeast-1",
  "ap-southeast-2",
];

pub const GLOBAL_ASSETS_DIR: &str = "global-s3-assets";
pub const REGIONAL_ASSETS_DIR: &str = "regional-s3-assets";
pub const TEMPLATE_URL_FILENAME: &str = "template_url.txt";
pub const STAGING_LOCK_FILENAME: &str = ".miepack.lock";

/// Suffix of the unsubstituted copy kept next to every rendered template.
pub const TEMPLATE_BACKUP_SUFFIX: &str = ".orig";

/// Prefix of the ephemeral environment directory in the system temp dir.
pub const ENV_DIR_PREFIX: &str = "miepack-env-";

/// Set by every Python virtual environment when activated.
pub const VIRTUAL_ENV_VAR: &str = "VIRTUAL_ENV";
