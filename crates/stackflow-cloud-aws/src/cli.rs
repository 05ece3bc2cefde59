//! aws CLI wrapper
//!
//! Runs `aws <service> <operation> ... --output json` with the profile,
//! region and credentials of an explicit [`ProviderContext`].

use crate::error::{AwsError, Result};
use serde::de::DeserializeOwned;
use stackflow_cloud::{Credentials, ProviderContext};
use std::process::Stdio;
use tokio::process::Command;

/// aws CLI wrapper
#[derive(Debug, Clone)]
pub struct AwsCli {
    program: String,
}

impl Default for AwsCli {
    fn default() -> Self {
        Self {
            program: "aws".to_string(),
        }
    }
}

impl AwsCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different executable (e.g. a pinned install path)
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run a command and return stdout
    pub async fn run(
        &self,
        ctx: &ProviderContext,
        region: Option<&str>,
        args: &[&str],
    ) -> Result<String> {
        let line = command_line(ctx, region, args);

        let mut cmd = Command::new(&self.program);
        cmd.args(&line);
        cmd.env("AWS_PAGER", "");
        if let Credentials::Static {
            access_key_id,
            secret_access_key,
            session_token,
        } = &ctx.credentials
        {
            cmd.env("AWS_ACCESS_KEY_ID", access_key_id);
            cmd.env("AWS_SECRET_ACCESS_KEY", secret_access_key);
            match session_token {
                Some(token) => cmd.env("AWS_SESSION_TOKEN", token),
                None => cmd.env_remove("AWS_SESSION_TOKEN"),
            };
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: {} {}", self.program, line.join(" "));

        let output = cmd.output().await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AwsError::AwsCliNotFound,
            _ => AwsError::IoError(e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(parse_error(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a command and deserialize its JSON output
    pub async fn json<T: DeserializeOwned>(
        &self,
        ctx: &ProviderContext,
        region: Option<&str>,
        args: &[&str],
    ) -> Result<T> {
        let output = self.run(ctx, region, args).await?;
        let output = if output.trim().is_empty() {
            "null"
        } else {
            output.as_str()
        };
        Ok(serde_json::from_str(output)?)
    }
}

/// Full argument list: the command, JSON output, then profile and region overrides
pub fn command_line(ctx: &ProviderContext, region: Option<&str>, args: &[&str]) -> Vec<String> {
    let mut line: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    line.push("--output".to_string());
    line.push("json".to_string());

    if let Some(profile) = &ctx.profile {
        line.push("--profile".to_string());
        line.push(profile.clone());
    }
    if let Some(region) = ctx.region_for(region) {
        line.push("--region".to_string());
        line.push(region.to_string());
    }
    line
}

/// Extract the service error code from aws CLI stderr.
///
/// The CLI reports service errors as
/// `An error occurred (Code) when calling the Operation operation: message`.
pub fn parse_error(stderr: &str) -> AwsError {
    let message = stderr.trim().to_string();
    let code = message
        .find("An error occurred (")
        .map(|start| &message[start + "An error occurred (".len()..])
        .and_then(|rest| rest.find(')').map(|end| rest[..end].to_string()))
        .unwrap_or_default();

    AwsError::CommandFailed { code, message }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Stand-in `aws` executable: logs each operation to `calls` and answers
    /// with the reply registered for it (`{}` otherwise)
    #[cfg(unix)]
    pub(crate) fn stub_cli(dir: &std::path::Path, replies: &[(&str, &str)]) -> AwsCli {
        use std::os::unix::fs::PermissionsExt;

        let mut script = format!(
            "#!/bin/sh\necho \"$2\" >> \"{}\"\ncase \"$2\" in\n",
            dir.join("calls").display()
        );
        for (operation, reply) in replies {
            script.push_str(&format!("  {}) echo '{}' ;;\n", operation, reply));
        }
        script.push_str("  *) echo '{}' ;;\nesac\n");

        let path = dir.join("aws");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        AwsCli::with_program(path.to_string_lossy().to_string())
    }

    #[test]
    fn test_command_line_uses_context() {
        let ctx = ProviderContext::new()
            .with_profile("ops")
            .with_region("ap-northeast-1");
        let line = command_line(&ctx, None, &["s3api", "head-bucket", "--bucket", "assets"]);
        assert_eq!(
            line,
            vec![
                "s3api", "head-bucket", "--bucket", "assets", "--output", "json", "--profile",
                "ops", "--region", "ap-northeast-1",
            ]
        );
    }

    #[test]
    fn test_command_line_prefers_handle_region() {
        let ctx = ProviderContext::new().with_region("ap-northeast-1");
        let line = command_line(&ctx, Some("us-east-1"), &["acm", "list-certificates"]);
        assert!(line.ends_with(&["--region".to_string(), "us-east-1".to_string()]));
        assert!(!line.contains(&"--profile".to_string()));
    }

    #[test]
    fn test_parse_service_error() {
        let err = parse_error(
            "\nAn error occurred (NoSuchBucket) when calling the HeadBucket operation: The specified bucket does not exist\n",
        );
        assert_eq!(err.code(), Some("NoSuchBucket"));
        assert!(err.to_string().contains("The specified bucket does not exist"));

        let err = parse_error(
            "fatal error: An error occurred (AccessDenied) when calling the ListObjectsV2 operation: Access Denied",
        );
        assert_eq!(err.code(), Some("AccessDenied"));
    }

    #[test]
    fn test_parse_error_without_code() {
        let err = parse_error("Unable to locate credentials. You can configure credentials by running \"aws configure\".");
        assert_eq!(err.code(), None);
    }
}
