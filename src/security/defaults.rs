#[must_use]
pub fn default_forbidden_paths() -> Vec<String> {
    vec![
        // System directories (blocked even when workspace_only=false)
        "/etc".into(),
        "/root".into(),
        "/home".into(),
        "/usr".into(),
        "/bin".into(),
        "/sbin".into(),
        "/lib".into(),
        "/boot".into(),
        "/dev".into(),
        "/proc".into(),
        "/sys".into(),
        // Sensitive dotfiles
        "~/.ssh".into(),
        "~/.gnupg".into(),
        "~/.aws".into(),
        "~/.config".into(),
    ]
}

/// Executables that are never permitted inside `shell_command`, approved or not.
#[must_use]
pub fn default_blocked_commands() -> Vec<String> {
    vec![
        "sudo".into(),
        "su".into(),
        "doas".into(),
        "mkfs".into(),
        "fdisk".into(),
        "shutdown".into(),
        "reboot".into(),
        "halt".into(),
        "poweroff".into(),
        "chown".into(),
        "chmod".into(),
        "crontab".into(),
    ]
}

/// Shell verbs that delete or overwrite data.
pub const DESTRUCTIVE_COMMANDS: &[&str] = &["rm", "rmdir", "shred", "dd", "truncate", "mv", "unlink"];

/// Shell verbs that reach the network.
pub const NETWORK_COMMANDS: &[&str] = &[
    "curl", "wget", "ssh", "scp", "sftp", "rsync", "nc", "ncat", "telnet", "ftp",
];

/// Git subcommands that talk to a remote.
pub const GIT_NETWORK_SUBCOMMANDS: &[&str] = &["push", "pull", "fetch", "clone", "ls-remote"];

/// URL schemes treated as outbound network activity.
pub const NETWORK_SCHEMES: &[&str] = &["http", "https", "ftp", "ftps", "ssh", "sftp", "ws", "wss"];
