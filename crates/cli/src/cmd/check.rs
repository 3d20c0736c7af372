use std::path::Path;

use anyhow::{Context, Result, bail};
use argp::FromArgs;
use code_checker_checks::Dispatcher;
use code_checker_core::{
    config::Config,
    models::{LanguageKind, RetrievedFile},
};
use code_checker_github::comments::format_comment;
use typed_path::Utf8NativePathBuf;

use crate::util::native_path;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Run the configured checkers on local files and print the comments a pull request
/// would receive. Exits with 1 when issues are found.
#[argp(subcommand, name = "check")]
pub struct Args {
    #[argp(option, short = 'c', from_str_fn(native_path))]
    /// config file (default: config.yml)
    config: Option<Utf8NativePathBuf>,
    #[argp(positional, from_str_fn(native_path))]
    /// files to check
    files: Vec<Utf8NativePathBuf>,
}

pub async fn run(args: Args) -> Result<i32> {
    let config_path = args.config.as_ref().map_or("config.yml", |p| p.as_str());
    let config = Config::read(config_path)?;
    config.checkers.validate()?;
    let root = std::env::current_dir().context("Failed to get working directory")?;
    let files = collect_files(&root, &args.files)?;
    let findings = Dispatcher::new(&config.checkers).run_checks(&files, &root).await;
    for finding in &findings {
        println!("{}\n", format_comment(finding));
    }
    Ok(if findings.is_empty() { 0 } else { 1 })
}

fn collect_files(root: &Path, paths: &[Utf8NativePathBuf]) -> Result<Vec<RetrievedFile>> {
    if paths.is_empty() {
        bail!("No files given");
    }
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let local_path = root.join(path.as_str());
        if !local_path.is_file() {
            bail!("{} is not a file", path);
        }
        let relative_path = match local_path.strip_prefix(root) {
            Ok(relative) => relative.to_string_lossy().into_owned(),
            Err(_) => path.to_string(),
        };
        files.push(RetrievedFile {
            kind: LanguageKind::from_path(&relative_path),
            relative_path,
            local_path,
        });
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/mod.py"), "x = 1\n").unwrap();
        let absolute = dir.path().join("pkg/mod.py").to_string_lossy().into_owned();
        let paths =
            [Utf8NativePathBuf::from("pkg/mod.py"), Utf8NativePathBuf::from(absolute.as_str())];
        let files = collect_files(dir.path(), &paths).unwrap();
        for file in &files {
            assert_eq!(file.relative_path, Path::new("pkg").join("mod.py").to_string_lossy());
            assert_eq!(file.kind, Some(LanguageKind::new("py")));
        }
    }

    #[test]
    fn test_collect_files_rejects_missing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = [Utf8NativePathBuf::from("nope.py")];
        assert!(collect_files(dir.path(), &paths).is_err());
        assert!(collect_files(dir.path(), &[]).is_err());
    }
}
