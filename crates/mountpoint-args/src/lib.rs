// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Normalized argument set for the Mountpoint FUSE client
//!
//! Raw mount options arrive in many shapes (`uid 1000`, `--uid=1000`,
//! `read-only`). [`Args::parse`] canonicalizes them into `--key[=value]`
//! entries and drops flags that make no sense under supervision.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

pub const ARG_FOREGROUND: &str = "--foreground";
pub const ARG_FOREGROUND_SHORT: &str = "-f";
pub const ARG_READ_ONLY: &str = "--read-only";
pub const ARG_ALLOW_OTHER: &str = "--allow-other";
pub const ARG_ALLOW_ROOT: &str = "--allow-root";
pub const ARG_REGION: &str = "--region";
pub const ARG_CACHE: &str = "--cache";
pub const ARG_USER_AGENT_PREFIX: &str = "--user-agent-prefix";
pub const ARG_AWS_MAX_ATTEMPTS: &str = "--aws-max-attempts";
pub const ARG_GID: &str = "--gid";
pub const ARG_DIR_MODE: &str = "--dir-mode";
pub const ARG_FILE_MODE: &str = "--file-mode";
pub const ARG_DEBUG: &str = "--debug";
pub const ARG_DEBUG_CRT: &str = "--debug-crt";

/// Flags stripped during parsing: they would detach the client or make it exit immediately.
pub const DISALLOWED_ARGS: &[&str] = &["--foreground", "-f", "--help", "-h", "--version", "-v"];

/// A single normalized argument
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Arg {
    key: String,
    value: Option<String>,
}

impl Arg {
    fn new(key: &str, value: Option<&str>) -> Self {
        Self {
            key: normalize_key(key),
            value: value.filter(|v| !v.is_empty()).map(str::to_string),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.key, value),
            None => write!(f, "{}", self.key),
        }
    }
}

/// Set of arguments to pass to Mountpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    args: BTreeSet<Arg>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse unnormalized arguments
    ///
    /// Accepted shapes are `--key=value`, `key=value`, `--key value`,
    /// `key value`, `--key` and `key`, with surrounding spaces trimmed.
    pub fn parse<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args = raw
            .into_iter()
            .map(|a| parse_one(a.as_ref()))
            .filter(|arg| !DISALLOWED_ARGS.contains(&arg.key.as_str()))
            .collect();
        Self { args }
    }

    /// Set or replace the value of `key`.
    pub fn set(&mut self, key: &str, value: Option<&str>) {
        self.remove(key);
        self.args.insert(Arg::new(key, value));
    }

    /// Set `key` only when it is not present yet.
    pub fn set_if_absent(&mut self, key: &str, value: Option<&str>) {
        if !self.has(key) {
            self.set(key, value);
        }
    }

    pub fn find(&self, key: &str) -> Option<&Arg> {
        let key = normalize_key(key);
        self.args.iter().find(|arg| arg.key == key)
    }

    /// Value of `key`; `None` when the key is absent or carries no value.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.find(key).and_then(Arg::value)
    }

    pub fn has(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Remove `key`, returning the removed entry.
    pub fn remove(&mut self, key: &str) -> Option<Arg> {
        let found = self.find(key).cloned()?;
        self.args.remove(&found);
        Some(found)
    }

    /// Rendered arguments in lexicographic order
    pub fn sorted_list(&self) -> Vec<String> {
        let mut list: Vec<String> = self.args.iter().map(Arg::to_string).collect();
        list.sort();
        list
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arg> {
        self.args.iter()
    }
}

impl<S: AsRef<str>> FromIterator<S> for Args {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Args::parse(iter)
    }
}

impl Serialize for Args {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.sorted_list().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Args {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        Ok(Args::parse(raw))
    }
}

fn parse_one(raw: &str) -> Arg {
    let trimmed = raw.trim_matches(' ');
    if let Some((key, value)) = trimmed.split_once('=') {
        return Arg::new(key, Some(value));
    }
    match trimmed.split_once(' ') {
        Some((key, value)) => Arg::new(key, Some(value.trim_matches(' '))),
        None => Arg::new(trimmed, None),
    }
}

/// Prefix `--` unless the key already starts with a dash.
pub fn normalize_key(key: &str) -> String {
    if key.starts_with('-') {
        key.to_string()
    } else {
        format!("--{}", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_accepted_shape() {
        let args = Args::parse([
            "--cache=/tmp/cache",
            "region=us-east-1",
            "--uid 1000",
            "gid 2000",
            "--read-only",
            "allow-other",
            "  --debug  ",
        ]);

        assert_eq!(
            args.sorted_list(),
            vec![
                "--allow-other",
                "--cache=/tmp/cache",
                "--debug",
                "--gid=2000",
                "--read-only",
                "--region=us-east-1",
                "--uid=1000",
            ]
        );
    }

    #[test]
    fn strips_disallowed_flags() {
        let args = Args::parse([
            "--foreground",
            "-f",
            "--help",
            "-h",
            "--version",
            "-v",
            "foreground",
            "--read-only",
        ]);
        assert_eq!(args.sorted_list(), vec!["--read-only"]);
    }

    #[test]
    fn value_keeps_everything_after_first_equals() {
        let args = Args::parse(["--user-agent-prefix=a=b"]);
        assert_eq!(args.value(ARG_USER_AGENT_PREFIX), Some("a=b"));
    }

    #[test]
    fn value_with_space_is_trimmed() {
        let args = Args::parse(["--uid    1000 "]);
        assert_eq!(args.value("uid"), Some("1000"));
    }

    #[test]
    fn set_replaces_existing_value() {
        let mut args = Args::parse(["--region=us-east-1"]);
        args.set(ARG_REGION, Some("eu-west-1"));
        assert_eq!(args.sorted_list(), vec!["--region=eu-west-1"]);

        args.set("read-only", None);
        assert!(args.has(ARG_READ_ONLY));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn set_if_absent_keeps_existing_value() {
        let mut args = Args::parse(["--aws-max-attempts=5"]);
        args.set_if_absent(ARG_AWS_MAX_ATTEMPTS, Some("10"));
        args.set_if_absent(ARG_ALLOW_ROOT, None);
        assert_eq!(
            args.sorted_list(),
            vec!["--allow-root", "--aws-max-attempts=5"]
        );
    }

    #[test]
    fn set_can_add_foreground_after_parsing() {
        let mut args = Args::new();
        args.set(ARG_FOREGROUND, None);
        assert!(args.has(ARG_FOREGROUND));
    }

    #[test]
    fn remove_returns_removed_entry() {
        let mut args = Args::parse(["--cache=/var/cache", "--read-only"]);

        let removed = args.remove("cache").unwrap();
        assert_eq!(removed.key(), ARG_CACHE);
        assert_eq!(removed.value(), Some("/var/cache"));
        assert!(!args.has(ARG_CACHE));
        assert!(args.remove(ARG_CACHE).is_none());
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn lookup_normalizes_key() {
        let args = Args::parse(["--dir-mode=0555"]);
        assert!(args.has("dir-mode"));
        assert!(args.has(ARG_DIR_MODE));
        assert!(!args.has(ARG_FILE_MODE));
        assert_eq!(args.value("dir-mode"), Some("0555"));
    }

    #[test]
    fn flag_without_value_has_no_value() {
        let args = Args::parse(["--debug-crt", "--gid="]);
        assert!(args.has(ARG_DEBUG_CRT));
        assert_eq!(args.value(ARG_DEBUG_CRT), None);
        assert_eq!(args.sorted_list(), vec!["--debug-crt", "--gid"]);
    }

    #[test]
    fn duplicate_inputs_collapse() {
        let args = Args::parse(["--read-only", "read-only", " --read-only "]);
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn short_flags_are_not_prefixed() {
        assert_eq!(normalize_key("-d"), "-d");
        assert_eq!(normalize_key("uid"), "--uid");
        assert_eq!(normalize_key("--uid"), "--uid");
    }

    #[test]
    fn serializes_as_sorted_string_list() {
        let args = Args::parse(["--region=us-east-1", "--allow-other"]);
        let json = serde_json::to_string(&args).unwrap();
        assert_eq!(json, r#"["--allow-other","--region=us-east-1"]"#);

        let back: Args = serde_json::from_str(r#"["region us-east-1","allow-other","-f"]"#).unwrap();
        assert_eq!(back, args);
    }
}
