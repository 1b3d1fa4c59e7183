use crate::supervisor::probe::PortOwner;

/// Conservative kill predicate: true only when the owner's command line
/// contains every configured token, case-insensitively. An empty or
/// unreadable command line, or an empty token list, is always unsafe.
pub fn is_safe_to_kill(owner: &PortOwner, allowlist: &[String]) -> bool {
    let cmdline = owner.cmdline.trim();
    if cmdline.is_empty() || allowlist.is_empty() {
        return false;
    }
    // Normalize path separators so a windows-style token matches a
    // unix-style command line and vice versa.
    let cmdline = cmdline.to_lowercase().replace('\\', "/");
    allowlist.iter().all(|token| {
        let token = token.trim().to_lowercase().replace('\\', "/");
        !token.is_empty() && cmdline.contains(&token)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(cmdline: &str) -> PortOwner {
        PortOwner {
            pid: 4242,
            cmdline: cmdline.to_string(),
        }
    }

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn requires_every_token() {
        let allowlist = tokens(&["cli.main", "/srv/backend"]);
        assert!(is_safe_to_kill(
            &owner("/srv/backend/.venv/bin/python -m cli.main server --port 8420"),
            &allowlist
        ));
        assert!(!is_safe_to_kill(
            &owner("/srv/backend/.venv/bin/python -m something.else"),
            &allowlist
        ));
        assert!(!is_safe_to_kill(
            &owner("/usr/bin/python -m cli.main server"),
            &allowlist
        ));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let allowlist = tokens(&["CLI.MAIN"]);
        assert!(is_safe_to_kill(&owner("python -m cli.main server"), &allowlist));
    }

    #[test]
    fn path_separators_are_normalized() {
        let allowlist = tokens(&[r"C:\my-git\dpolaris_ai"]);
        assert!(is_safe_to_kill(
            &owner(r"c:\my-git\dpolaris_ai\.venv\scripts\python.exe -m cli.main server"),
            &allowlist
        ));
        assert!(is_safe_to_kill(
            &owner("c:/my-git/dpolaris_ai/.venv/scripts/python.exe -m cli.main server"),
            &allowlist
        ));
    }

    #[test]
    fn unreadable_cmdline_is_never_safe() {
        let allowlist = tokens(&["cli.main"]);
        assert!(!is_safe_to_kill(&owner(""), &allowlist));
        assert!(!is_safe_to_kill(&owner("   "), &allowlist));
    }

    #[test]
    fn empty_allowlist_is_never_safe() {
        assert!(!is_safe_to_kill(&owner("python -m cli.main server"), &[]));
    }
}
