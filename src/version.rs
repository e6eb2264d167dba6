use chrono::{DateTime, Local};

pub fn get_version_info() -> String {
    let version = env!("CARGO_PKG_VERSION");
    let build_time = env!("BUILD_TIME");
    let git_commit = env!("GIT_COMMIT_HASH");

    let build_timestamp: i64 = build_time.parse().unwrap_or(0);
    let build_datetime: DateTime<Local> = DateTime::from_timestamp(build_timestamp, 0)
        .map(|utc| utc.with_timezone(&Local))
        .unwrap_or_else(Local::now);
    let build_time_str = build_datetime.format("%Y-%m-%d %H:%M:%S %Z").to_string();

    format!(
        "notisync {}\nBuild Time: {}\nGit Commit: {}",
        version, build_time_str, git_commit
    )
}

/// Client identification string carried in the registration payload and the
/// REST User-Agent header.
pub fn get_useragent() -> String {
    format!("notisync/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info_carries_package_version() {
        let info = get_version_info();
        assert!(info.contains(env!("CARGO_PKG_VERSION")));
        assert!(info.contains("Git Commit:"));
    }

    #[test]
    fn test_useragent_format() {
        assert_eq!(
            get_useragent(),
            format!("notisync/{}", env!("CARGO_PKG_VERSION"))
        );
    }
}
