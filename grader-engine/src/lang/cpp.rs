use super::*;

pub struct Cpp {
    pub compiler: String,
}

impl Default for Cpp {
    fn default() -> Self {
        Self {
            compiler: "g++".to_owned(),
        }
    }
}

impl Language for Cpp {
    fn lang_name(&self) -> &str {
        "cpp"
    }

    fn src_name(&self) -> &str {
        "submission.cpp"
    }

    fn exe_name(&self) -> &str {
        "submission"
    }

    fn comment_token(&self) -> &str {
        "//"
    }

    fn compile_cmd(&self, workspace: &Path) -> OsCmd {
        let mut cmd = OsCmd::new(&self.compiler);
        cmd.arg("-std=c++17")
            .arg(workspace.join(self.src_name()))
            .arg("-O2")
            .arg("-o")
            .arg(workspace.join(self.exe_name()));
        // the driver locates cc1plus and the assembler through PATH
        cmd.inherit_env("PATH").add_env("LC_ALL", "C");
        cmd
    }

    fn run_cmd(&self, workspace: &Path) -> OsCmd {
        OsCmd::new(workspace.join(self.exe_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::ffi::OsString;

    #[test]
    fn fixed_flags() {
        let cpp = Cpp::default();
        let cmd = cpp.compile_cmd(Path::new("/w"));
        assert_eq!(cmd.bin, Path::new("g++"));
        let expected: Vec<OsString> = vec![
            "-std=c++17".into(),
            "/w/submission.cpp".into(),
            "-O2".into(),
            "-o".into(),
            "/w/submission".into(),
        ];
        assert_eq!(cmd.args, expected);
        assert!(cmd.env.contains(&OsString::from("LC_ALL=C")));
    }

    #[test]
    fn run_has_clean_env() {
        let cmd = Cpp::default().run_cmd(Path::new("/w"));
        assert_eq!(cmd.bin, Path::new("/w/submission"));
        assert!(cmd.args.is_empty());
        assert!(cmd.env.is_empty());
    }
}
