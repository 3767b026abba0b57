//! GitHub URL and local target parsing

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use super::RepoError;

/// A parsed GitHub URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    /// `https://github.com/owner/repo`, with any deeper segments removed
    pub repo_url: String,

    /// Branch from a `/tree/<branch>` segment, when present
    pub branch: Option<String>,

    /// Path below the branch, relative with `/` separators; empty for the
    /// repository root
    pub subpath: String,
}

/// Where the analysis targets live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoSource {
    Remote { repo_url: String },
    Local { root: PathBuf },
}

/// One repository plus the directories to analyze within it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTargets {
    pub source: RepoSource,
    /// Branch for remote sources; local sources have none
    pub branch: Option<String>,
    /// Directories relative to the repository root, `.` for the root itself
    pub dirs: Vec<String>,
}

/// Check whether a string names a GitHub repository.
///
/// Accepts an optional leading `@` and requires at least `owner/repo`
/// after the host.
pub fn is_github_url(s: &str) -> bool {
    let s = s.strip_prefix('@').unwrap_or(s);
    let rest = match s
        .strip_prefix("https://github.com/")
        .or_else(|| s.strip_prefix("http://github.com/"))
    {
        Some(rest) => rest,
        None => return false,
    };

    let mut segments = rest.splitn(3, '/');
    let owner = segments.next().unwrap_or("");
    let repo = segments.next().unwrap_or("");
    !owner.is_empty() && !repo.is_empty()
}

/// Split a GitHub URL into repository, branch, and subpath.
///
/// `https://github.com/owner/repo/tree/main/src/lib` parses to the repo
/// URL, branch `main`, and subpath `src/lib`. A URL without `/tree/` keeps
/// everything past `owner/repo` as the subpath with no branch.
pub fn parse_github_url(url: &str) -> Result<RepoUrl, RepoError> {
    let cleaned = url.strip_prefix('@').unwrap_or(url).trim_end_matches('/');
    if !is_github_url(cleaned) {
        return Err(RepoError::InvalidUrl(url.to_string()));
    }

    // ["https:", "", "github.com", owner, repo, rest...]
    let parts: Vec<&str> = cleaned.split('/').collect();
    let repo_url = parts[..5].join("/");

    let (branch, subpath) = match parts.get(5) {
        None => (None, String::new()),
        Some(&"tree") => {
            let branch = parts.get(6).ok_or_else(|| RepoError::InvalidUrl(url.to_string()))?;
            let subpath = if parts.len() > 7 { parts[7..].join("/") } else { String::new() };
            (Some(branch.to_string()), subpath)
        }
        Some(_) => (None, parts[5..].join("/")),
    };

    debug!(%repo_url, ?branch, %subpath, "parse_github_url: parsed");
    Ok(RepoUrl {
        repo_url,
        branch,
        subpath,
    })
}

/// Parse the multi-target form of `analyze`.
///
/// Every argument must be a GitHub tree URL naming the same repository and
/// branch, or a local path (optionally `@`-prefixed). Local paths reduce to
/// their common parent plus relative directories.
pub fn parse_targets(args: &[String]) -> Result<RepoTargets, RepoError> {
    if args.is_empty() {
        return Err(RepoError::NoTargets);
    }

    let cleaned: Vec<&str> = args.iter().map(|a| a.strip_prefix('@').unwrap_or(a)).collect();
    let github_count = cleaned.iter().filter(|a| is_github_url(a)).count();

    if github_count == cleaned.len() {
        parse_remote_targets(&cleaned)
    } else if github_count == 0 {
        parse_local_targets(&cleaned)
    } else {
        Err(RepoError::MixedTargets)
    }
}

fn parse_remote_targets(urls: &[&str]) -> Result<RepoTargets, RepoError> {
    let mut repo_url = None;
    let mut branch = None;
    let mut dirs = Vec::with_capacity(urls.len());

    for url in urls {
        let parsed = parse_github_url(url)?;
        let url_branch = parsed
            .branch
            .ok_or_else(|| RepoError::InvalidUrl(format!("{url} (expected a /tree/<branch>/<dir> URL)")))?;
        if parsed.subpath.is_empty() {
            return Err(RepoError::InvalidUrl(format!("{url} (URL names no directory)")));
        }

        match &repo_url {
            None => {
                repo_url = Some(parsed.repo_url);
                branch = Some(url_branch);
            }
            Some(first_repo) => {
                if *first_repo != parsed.repo_url {
                    return Err(RepoError::RepoMismatch);
                }
                if branch.as_deref() != Some(url_branch.as_str()) {
                    return Err(RepoError::BranchMismatch);
                }
            }
        }
        dirs.push(parsed.subpath);
    }

    // urls is non-empty, so both are set by the first iteration
    let repo_url = repo_url.ok_or(RepoError::NoTargets)?;
    Ok(RepoTargets {
        source: RepoSource::Remote { repo_url },
        branch,
        dirs,
    })
}

fn parse_local_targets(paths: &[&str]) -> Result<RepoTargets, RepoError> {
    let paths: Vec<&Path> = paths.iter().map(Path::new).collect();

    let absolute = paths.iter().filter(|p| p.is_absolute()).count();
    if absolute != 0 && absolute != paths.len() {
        return Err(RepoError::MixedPathForms);
    }

    let (root, dirs) = if paths.len() == 1 {
        single_local_target(paths[0])
    } else {
        let root = common_parent(&paths);
        let dirs = paths
            .iter()
            .map(|p| relative_dir(p, &root))
            .collect::<Result<Vec<_>, _>>()?;
        (root, dirs)
    };

    let root = if root.as_os_str().is_empty() { PathBuf::from(".") } else { root };
    debug!(root = %root.display(), ?dirs, "parse_targets: local");
    Ok(RepoTargets {
        source: RepoSource::Local { root },
        branch: None,
        dirs,
    })
}

/// A lone local path becomes parent-root plus basename, so the output key
/// is the directory's own name
fn single_local_target(path: &Path) -> (PathBuf, Vec<String>) {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => (parent.to_path_buf(), vec![name.to_string_lossy().into_owned()]),
        _ => (path.to_path_buf(), vec![".".to_string()]),
    }
}

fn common_parent(paths: &[&Path]) -> PathBuf {
    let first: Vec<Component> = paths[0].components().collect();
    let mut shared = first.len();

    for path in &paths[1..] {
        let matched = first
            .iter()
            .zip(path.components())
            .take_while(|(a, b)| **a == *b)
            .count();
        shared = shared.min(matched);
    }

    first[..shared].iter().collect()
}

fn relative_dir(path: &Path, root: &Path) -> Result<String, RepoError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| RepoError::InvalidUrl(path.display().to_string()))?;
    if relative.as_os_str().is_empty() {
        Ok(".".to_string())
    } else {
        Ok(relative.to_string_lossy().replace('\\', "/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_github_url() {
        assert!(is_github_url("https://github.com/user/repo"));
        assert!(is_github_url("https://github.com/user/repo/tree/main/src"));
        assert!(is_github_url("http://github.com/user/repo"));
        assert!(is_github_url("@https://github.com/user/repo"));

        assert!(!is_github_url("https://github.com/user"));
        assert!(!is_github_url("https://gitlab.com/user/repo"));
        assert!(!is_github_url("/local/path"));
        assert!(!is_github_url("src/module"));
    }

    #[test]
    fn test_parse_bare_repo_url() {
        let parsed = parse_github_url("https://github.com/user/repo").unwrap();
        assert_eq!(parsed.repo_url, "https://github.com/user/repo");
        assert_eq!(parsed.branch, None);
        assert_eq!(parsed.subpath, "");
    }

    #[test]
    fn test_parse_tree_url_with_subpath() {
        let parsed = parse_github_url("https://github.com/user/repo/tree/master/src/module").unwrap();
        assert_eq!(parsed.repo_url, "https://github.com/user/repo");
        assert_eq!(parsed.branch, Some("master".to_string()));
        assert_eq!(parsed.subpath, "src/module");
    }

    #[test]
    fn test_parse_tree_url_branch_only() {
        let parsed = parse_github_url("https://github.com/user/repo/tree/develop").unwrap();
        assert_eq!(parsed.branch, Some("develop".to_string()));
        assert_eq!(parsed.subpath, "");
    }

    #[test]
    fn test_parse_trailing_slash_and_at_prefix() {
        let parsed = parse_github_url("@https://github.com/user/repo/tree/main/docs/").unwrap();
        assert_eq!(parsed.branch, Some("main".to_string()));
        assert_eq!(parsed.subpath, "docs");
    }

    #[test]
    fn test_parse_tree_without_branch_is_invalid() {
        assert!(matches!(
            parse_github_url("https://github.com/user/repo/tree"),
            Err(RepoError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_parse_non_github_is_invalid() {
        assert!(matches!(
            parse_github_url("https://gitlab.com/user/repo"),
            Err(RepoError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_targets_remote_same_repo_and_branch() {
        let args = vec![
            "https://github.com/user/repo/tree/main/src".to_string(),
            "https://github.com/user/repo/tree/main/tests/unit".to_string(),
        ];

        let targets = parse_targets(&args).unwrap();

        assert_eq!(
            targets.source,
            RepoSource::Remote {
                repo_url: "https://github.com/user/repo".to_string()
            }
        );
        assert_eq!(targets.branch, Some("main".to_string()));
        assert_eq!(targets.dirs, vec!["src", "tests/unit"]);
    }

    #[test]
    fn test_targets_remote_repo_mismatch() {
        let args = vec![
            "https://github.com/user/repo/tree/main/src".to_string(),
            "https://github.com/user/other/tree/main/src".to_string(),
        ];
        assert!(matches!(parse_targets(&args), Err(RepoError::RepoMismatch)));
    }

    #[test]
    fn test_targets_remote_branch_mismatch() {
        let args = vec![
            "https://github.com/user/repo/tree/main/src".to_string(),
            "https://github.com/user/repo/tree/dev/src".to_string(),
        ];
        assert!(matches!(parse_targets(&args), Err(RepoError::BranchMismatch)));
    }

    #[test]
    fn test_targets_remote_requires_directory() {
        let args = vec!["https://github.com/user/repo/tree/main".to_string()];
        assert!(matches!(parse_targets(&args), Err(RepoError::InvalidUrl(_))));
    }

    #[test]
    fn test_targets_mixed_remote_and_local() {
        let args = vec![
            "https://github.com/user/repo/tree/main/src".to_string(),
            "/local/dir".to_string(),
        ];
        assert!(matches!(parse_targets(&args), Err(RepoError::MixedTargets)));
    }

    #[test]
    fn test_targets_single_absolute_path() {
        let args = vec!["/home/user/project/src".to_string()];
        let targets = parse_targets(&args).unwrap();

        assert_eq!(
            targets.source,
            RepoSource::Local {
                root: PathBuf::from("/home/user/project")
            }
        );
        assert_eq!(targets.branch, None);
        assert_eq!(targets.dirs, vec!["src"]);
    }

    #[test]
    fn test_targets_single_relative_path() {
        let args = vec!["src/module".to_string()];
        let targets = parse_targets(&args).unwrap();

        assert_eq!(
            targets.source,
            RepoSource::Local {
                root: PathBuf::from("src")
            }
        );
        assert_eq!(targets.dirs, vec!["module"]);
    }

    #[test]
    fn test_targets_multiple_share_common_parent() {
        let args = vec![
            "/home/user/project/src".to_string(),
            "/home/user/project/tests".to_string(),
        ];
        let targets = parse_targets(&args).unwrap();

        assert_eq!(
            targets.source,
            RepoSource::Local {
                root: PathBuf::from("/home/user/project")
            }
        );
        assert_eq!(targets.dirs, vec!["src", "tests"]);
    }

    #[test]
    fn test_targets_multiple_without_common_component() {
        let args = vec!["src".to_string(), "lib".to_string()];
        let targets = parse_targets(&args).unwrap();

        assert_eq!(
            targets.source,
            RepoSource::Local {
                root: PathBuf::from(".")
            }
        );
        assert_eq!(targets.dirs, vec!["src", "lib"]);
    }

    #[test]
    fn test_targets_nested_paths_use_outer_as_root() {
        let args = vec!["/data/proj".to_string(), "/data/proj/sub".to_string()];
        let targets = parse_targets(&args).unwrap();

        assert_eq!(
            targets.source,
            RepoSource::Local {
                root: PathBuf::from("/data/proj")
            }
        );
        assert_eq!(targets.dirs, vec![".", "sub"]);
    }

    #[test]
    fn test_targets_at_prefixed_local_path() {
        let args = vec!["@/home/user/project/src".to_string()];
        let targets = parse_targets(&args).unwrap();
        assert_eq!(targets.dirs, vec!["src"]);
    }

    #[test]
    fn test_targets_mixed_path_forms() {
        let args = vec!["/abs/path".to_string(), "rel/path".to_string()];
        assert!(matches!(parse_targets(&args), Err(RepoError::MixedPathForms)));
    }

    #[test]
    fn test_targets_empty() {
        assert!(matches!(parse_targets(&[]), Err(RepoError::NoTargets)));
    }
}
