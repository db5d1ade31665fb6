use std::env;
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

/// A command line with an explicit environment.
///
/// The child never sees the parent's environment unless a variable is
/// inherited by name.
#[derive(Debug, Clone)]
pub struct OsCmd {
    pub bin: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<OsString>, // `KEY=VALUE`
}

impl OsCmd {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(&mut self, a: impl Into<OsString>) -> &mut Self {
        self.args.push(a.into());
        self
    }

    /// Copies `k` from the current process environment, if it is set.
    pub fn inherit_env(&mut self, k: impl AsRef<OsStr>) -> &mut Self {
        let k = k.as_ref();
        match env::var_os(k) {
            Some(v) => self.add_env(k, v),
            None => self,
        }
    }

    pub fn add_env(&mut self, k: impl Into<OsString>, v: impl AsRef<OsStr>) -> &mut Self {
        let mut e: OsString = k.into();
        e.push(OsStr::from_bytes(b"="));
        e.push(v.as_ref());
        self.env.push(e);
        self
    }

    pub fn env_pairs(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> + '_ {
        self.env.iter().filter_map(|e| {
            let bytes = e.as_bytes();
            let pos = bytes.iter().position(|&b| b == b'=')?;
            let k = OsStr::from_bytes(&bytes[..pos]);
            let v = OsStr::from_bytes(&bytes[pos + 1..]);
            Some((k, v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_pairs_split_on_first_eq() {
        let mut cmd = OsCmd::new("g++");
        cmd.add_env("A", "1=2").add_env("EMPTY", "");
        let pairs: Vec<_> = cmd.env_pairs().collect();
        assert_eq!(pairs[0], (OsStr::new("A"), OsStr::new("1=2")));
        assert_eq!(pairs[1], (OsStr::new("EMPTY"), OsStr::new("")));
    }

    #[test]
    fn inherit_missing_env_is_noop() {
        let mut cmd = OsCmd::new("g++");
        cmd.inherit_env("GRADER_SURELY_UNSET_VARIABLE");
        assert!(cmd.env.is_empty());
    }
}
