//! Common test utilities and helpers
//!
//! Shared by the CLI and delivery integration tests.

#![allow(dead_code)]

use apns_push::config::ApnsConfig;
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const TEAM_ID: &str = "ABCDE12345";
pub const KEY_ID: &str = "TESTKEY123";
pub const BUNDLE_ID: &str = "com.example.app";
pub const DEVICE_TOKEN: &str = "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";

const CREDENTIAL_VARS: &[&str] = &[
    "APNS_PUSH_CONFIG",
    "APNS_TEAM_ID",
    "APNS_KEY_ID",
    "APNS_KEY_PATH",
    "APNS_BUNDLE_ID",
    "APNS_TOPIC",
    "APNS_ENDPOINT",
];

/// Path of the throwaway P-256 signing key
pub fn key_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("AuthKey_TESTKEY123.p8")
}

/// Client configuration pointed at a local server
pub fn test_config(endpoint: &str) -> ApnsConfig {
    ApnsConfig::new(TEAM_ID, KEY_ID, BUNDLE_ID)
        .with_key_path(key_path())
        .with_endpoint(endpoint)
}

/// Test command builder for the apns-push CLI
pub struct TestCommand {
    cmd: Command,
}

impl TestCommand {
    pub fn new() -> Self {
        let mut cmd = Command::cargo_bin("apns-push").expect("Failed to find apns-push binary");
        for var in CREDENTIAL_VARS {
            cmd.env_remove(var);
        }
        Self { cmd }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.cmd.arg(arg.as_ref());
        }
        self
    }

    pub fn arg<S: AsRef<str>>(mut self, arg: S) -> Self {
        self.cmd.arg(arg.as_ref());
        self
    }

    pub fn env<K, V>(mut self, key: K, val: V) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.cmd.env(key.as_ref(), val.as_ref());
        self
    }

    /// Execute and expect success
    pub fn expect_success(mut self) -> TestAssertion {
        let assert = self.cmd.assert().success();
        TestAssertion { assert }
    }

    /// Execute and expect a non-zero exit
    pub fn expect_failure(mut self) -> TestAssertion {
        let assert = self.cmd.assert().failure();
        TestAssertion { assert }
    }
}

impl Default for TestCommand {
    fn default() -> Self {
        Self::new()
    }
}

/// Test assertion wrapper with convenient methods
pub struct TestAssertion {
    assert: assert_cmd::assert::Assert,
}

impl TestAssertion {
    pub fn stdout_contains<S: AsRef<str>>(self, text: S) -> Self {
        let assert = self.assert.stdout(predicate::str::contains(text.as_ref()));
        Self { assert }
    }

    pub fn stdout_lacks<S: AsRef<str>>(self, text: S) -> Self {
        let assert = self
            .assert
            .stdout(predicate::str::contains(text.as_ref()).not());
        Self { assert }
    }

    pub fn stderr_contains<S: AsRef<str>>(self, text: S) -> Self {
        let assert = self.assert.stderr(predicate::str::contains(text.as_ref()));
        Self { assert }
    }

    pub fn done(self) -> assert_cmd::assert::Assert {
        self.assert
    }
}

/// Temporary directory holding a config file
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub config_path: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("apns-push").join("config.toml");

        Self {
            temp_dir,
            config_path,
        }
    }

    /// Write a config file with working credentials for the fixture key
    pub fn write_config(&self, extra: &str) {
        std::fs::create_dir_all(self.config_path.parent().unwrap()).unwrap();
        let content = format!(
            "[apns]\nteam_id = \"{TEAM_ID}\"\nkey_id = \"{KEY_ID}\"\nbundle_id = \"{BUNDLE_ID}\"\nkey_path = {:?}\n{extra}",
            key_path().display().to_string()
        );
        std::fs::write(&self.config_path, content).unwrap();
    }

    /// A command that reads this environment's config file
    pub fn command(&self) -> TestCommand {
        TestCommand::new()
            .arg("--config")
            .arg(self.config_path.to_string_lossy().as_ref())
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}
