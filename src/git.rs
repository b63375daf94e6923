// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration repository inspection.
//!
//! Most users keep their configuration directory under Git. Before syncing,
//! nixsync checks whether the upstream branch moved and offers to pull.
//!
//! Read-only queries (branch, status, revisions) go through libgit2. Anything
//! that talks to a remote (`git remote update`, `git pull`) is delegated to
//! the git binary through the [`Runner`](crate::run::Runner), so the user's
//! own credential helpers and SSH agent keep working.

use git2::{BranchType, ErrorCode, Oid, Repository, Status, StatusOptions};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::Path,
};
use tracing::{debug, instrument};

/// Relation of the local branch to its upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Divergence {
    UpToDate,

    /// Upstream has commits the local branch lacks.
    Behind,

    /// Local branch has commits upstream lacks.
    Ahead,

    /// Both sides have commits the other lacks.
    Diverged,

    /// Branch has no upstream, or HEAD is detached.
    NoUpstream,
}

impl Divergence {
    /// Classify local and remote revisions by their merge base.
    pub fn classify(local: Oid, remote: Oid, base: Oid) -> Self {
        if local == remote {
            Self::UpToDate
        } else if local == base {
            Self::Behind
        } else if remote == base {
            Self::Ahead
        } else {
            Self::Diverged
        }
    }
}

impl Display for Divergence {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::UpToDate => "up to date with upstream",
            Self::Behind => "behind upstream",
            Self::Ahead => "ahead of upstream, local commits are not pushed",
            Self::Diverged => "diverged from upstream",
            Self::NoUpstream => "not tracking an upstream branch",
        })
    }
}

/// Git repository holding the user's configuration.
pub struct ConfigRepo {
    repository: Repository,
}

impl ConfigRepo {
    /// Open repository containing target directory.
    ///
    /// Returns [`None`] if the directory is not inside a Git repository.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::Git2`] if repository exists but cannot be opened.
    #[instrument(skip(path), level = "debug")]
    pub fn discover(path: impl AsRef<Path>) -> Result<Option<Self>> {
        match Repository::discover(path.as_ref()) {
            Ok(repository) => Ok(Some(Self { repository })),
            Err(err) if err.code() == ErrorCode::NotFound => {
                debug!("{} is not a git repository", path.as_ref().display());
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Name of current branch.
    ///
    /// An unborn branch reports the name it will get on first commit. A
    /// detached HEAD reports "HEAD".
    ///
    /// # Errors
    ///
    /// - Return [`GitError::Git2`] if HEAD cannot be read.
    pub fn branch(&self) -> Result<String> {
        match self.repository.head() {
            Ok(head) => Ok(head.shorthand().unwrap_or("HEAD").to_string()),
            Err(err) if err.code() == ErrorCode::UnbornBranch => {
                let head = self.repository.find_reference("HEAD")?;
                let target = head.symbolic_target().unwrap_or("HEAD");
                Ok(target.trim_start_matches("refs/heads/").to_string())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Short status lines of the working tree, e.g., " M flake.nix".
    ///
    /// # Errors
    ///
    /// - Return [`GitError::Git2`] if status cannot be computed.
    pub fn status_lines(&self) -> Result<Vec<String>> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = self.repository.statuses(Some(&mut opts))?;

        let mut lines = Vec::new();
        for entry in statuses.iter() {
            let status = entry.status();
            if status.is_ignored() {
                continue;
            }
            let path = entry.path().unwrap_or("<non-utf8 path>");
            lines.push(format!("{}{} {path}", index_flag(status), worktree_flag(status)));
        }

        Ok(lines)
    }

    /// Compare local branch against its upstream.
    ///
    /// Uses whatever remote-tracking refs are present. Refresh them first
    /// with `git remote update` to get a current answer.
    ///
    /// # Errors
    ///
    /// - Return [`GitError::Git2`] if revisions cannot be resolved.
    #[instrument(skip(self), level = "debug")]
    pub fn divergence(&self) -> Result<Divergence> {
        let head = match self.repository.head() {
            Ok(head) if head.is_branch() => head,
            Ok(_) => return Ok(Divergence::NoUpstream),
            Err(err) if err.code() == ErrorCode::UnbornBranch => {
                return Ok(Divergence::NoUpstream)
            }
            Err(err) => return Err(err.into()),
        };

        let Some(name) = head.shorthand() else {
            return Ok(Divergence::NoUpstream);
        };
        let branch = self.repository.find_branch(name, BranchType::Local)?;
        let upstream = match branch.upstream() {
            Ok(upstream) => upstream,
            Err(err) if err.code() == ErrorCode::NotFound => return Ok(Divergence::NoUpstream),
            Err(err) => return Err(err.into()),
        };

        let local = head.peel_to_commit()?.id();
        let remote = upstream.get().peel_to_commit()?.id();
        let base = self.repository.merge_base(local, remote)?;
        debug!("local {local}, remote {remote}, base {base}");

        Ok(Divergence::classify(local, remote, base))
    }

    /// Top-level directory of the working tree.
    pub fn workdir(&self) -> Option<&Path> {
        self.repository.workdir()
    }
}

fn index_flag(status: Status) -> char {
    if status.is_index_new() {
        'A'
    } else if status.is_index_modified() {
        'M'
    } else if status.is_index_deleted() {
        'D'
    } else if status.is_index_renamed() {
        'R'
    } else if status.is_index_typechange() {
        'T'
    } else if status.is_wt_new() {
        '?'
    } else {
        ' '
    }
}

fn worktree_flag(status: Status) -> char {
    if status.is_wt_new() {
        '?'
    } else if status.is_wt_modified() {
        'M'
    } else if status.is_wt_deleted() {
        'D'
    } else if status.is_wt_renamed() {
        'R'
    } else if status.is_wt_typechange() {
        'T'
    } else if status.is_conflicted() {
        'U'
    } else {
        ' '
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
type Result<T, E = GitError> = std::result::Result<T, E>;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use git2::{RepositoryInitOptions, Signature};
    use pretty_assertions::assert_eq;
    use std::fs;

    pub(crate) struct RepoFixture {
        pub(crate) repo: Repository,
    }

    impl RepoFixture {
        pub(crate) fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
            let mut opts = RepositoryInitOptions::new();
            opts.initial_head("main");
            let repo = Repository::init_opts(path.as_ref(), &opts)?;

            // INVARIANT: Always provide valid name and email.
            //   - Git will complain if this is not set in CI/CD environments.
            let mut config = repo.config()?;
            config.set_str("user.name", "John Doe")?;
            config.set_str("user.email", "john@doe.com")?;

            Ok(Self { repo })
        }

        pub(crate) fn commit_file(&self, name: &str, contents: &str) -> anyhow::Result<Oid> {
            let workdir = self.repo.workdir().expect("fixture is not bare");
            fs::write(workdir.join(name), contents)?;

            let mut index = self.repo.index()?;
            index.add_path(Path::new(name))?;
            index.write()?;
            let tree = self.repo.find_tree(index.write_tree()?)?;

            let signature = Signature::now("John Doe", "john@doe.com")?;
            let mut parents = Vec::new();
            if let Ok(head) = self.repo.head() {
                parents.push(head.peel_to_commit()?);
            }
            let parents = parents.iter().collect::<Vec<_>>();

            Ok(self.repo.commit(
                Some("HEAD"),
                &signature,
                &signature,
                &format!("chore: add {name}"),
                &tree,
                &parents,
            )?)
        }
    }

    #[test]
    fn classify_divergence() {
        let a = Oid::from_str("1111111111111111111111111111111111111111").unwrap();
        let b = Oid::from_str("2222222222222222222222222222222222222222").unwrap();
        let c = Oid::from_str("3333333333333333333333333333333333333333").unwrap();

        assert_eq!(Divergence::classify(a, a, a), Divergence::UpToDate);
        assert_eq!(Divergence::classify(a, b, a), Divergence::Behind);
        assert_eq!(Divergence::classify(a, b, b), Divergence::Ahead);
        assert_eq!(Divergence::classify(a, b, c), Divergence::Diverged);
    }

    #[test]
    fn discover_outside_repository_is_none() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(ConfigRepo::discover(dir.path())?.is_none());

        Ok(())
    }

    #[test]
    fn branch_status_and_divergence_of_fresh_repository() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let fixture = RepoFixture::new(dir.path())?;
        let repo = ConfigRepo::discover(dir.path())?.expect("fixture is a repository");
        assert_eq!(repo.branch()?, "main");
        assert_eq!(repo.divergence()?, Divergence::NoUpstream);

        fixture.commit_file("flake.nix", "{ }")?;
        fs::write(dir.path().join("flake.nix"), "{ inputs = { }; }")?;
        fs::write(dir.path().join("hardware.nix"), "{ }")?;
        assert_eq!(repo.branch()?, "main");
        assert_eq!(
            repo.status_lines()?,
            vec![" M flake.nix".to_string(), "?? hardware.nix".to_string()]
        );
        assert_eq!(repo.divergence()?, Divergence::NoUpstream);

        Ok(())
    }

    #[test]
    fn divergence_against_upstream() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let fixture = RepoFixture::new(dir.path())?;
        let first = fixture.commit_file("flake.nix", "{ }")?;

        // INVARIANT: Fake an upstream through a remote-tracking ref.
        fixture.repo.remote("origin", "https://example.org/nixos.git")?;
        fixture
            .repo
            .reference("refs/remotes/origin/main", first, true, "fake fetch")?;
        let mut config = fixture.repo.config()?;
        config.set_str("branch.main.remote", "origin")?;
        config.set_str("branch.main.merge", "refs/heads/main")?;

        let repo = ConfigRepo::discover(dir.path())?.expect("fixture is a repository");
        assert_eq!(repo.divergence()?, Divergence::UpToDate);

        fixture.commit_file("host.nix", "{ }")?;
        assert_eq!(repo.divergence()?, Divergence::Ahead);

        Ok(())
    }
}
