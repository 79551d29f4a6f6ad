use super::SandboxPolicy;

/// One pipeline/list element of a shell command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSegment {
    /// Program basename (`/bin/rm` becomes `rm`).
    pub program: String,
    pub args: Vec<String>,
    /// Targets of `>`/`>>` redirections.
    pub redirect_targets: Vec<String>,
}

/// Split a command line on `;`, `&&`, `||`, `|` and newlines, then tokenize
/// each segment on whitespace. Quotes are stripped, not interpreted.
pub fn parse_command(command: &str) -> Vec<CommandSegment> {
    let normalized = command
        .replace("&&", "\n")
        .replace("||", "\n")
        .replace([';', '|'], "\n");

    normalized
        .lines()
        .filter_map(|segment| parse_segment(skip_env_assignments(segment.trim())))
        .collect()
}

fn parse_segment(segment: &str) -> Option<CommandSegment> {
    let mut words = segment
        .split_whitespace()
        .map(|w| w.trim_matches(|c| c == '"' || c == '\''));
    let first = words.next()?;
    let program = first.rsplit('/').next().unwrap_or(first).to_string();

    let mut args = Vec::new();
    let mut redirect_targets = Vec::new();
    let mut expect_target = false;
    for word in words {
        if expect_target {
            redirect_targets.push(word.to_string());
            expect_target = false;
            continue;
        }
        if let Some(rest) = word.strip_prefix(">>").or_else(|| word.strip_prefix('>')) {
            if rest.is_empty() {
                expect_target = true;
            } else if !rest.starts_with('&') {
                redirect_targets.push(rest.to_string());
            }
            continue;
        }
        if let Some((_, rest)) = word.split_once('>')
            && word.starts_with(|c: char| c.is_ascii_digit())
        {
            // 2>file, 1>>file
            let rest = rest.trim_start_matches('>');
            if rest.is_empty() {
                expect_target = true;
            } else if !rest.starts_with('&') {
                redirect_targets.push(rest.to_string());
            }
            continue;
        }
        args.push(word.to_string());
    }

    Some(CommandSegment {
        program,
        args,
        redirect_targets,
    })
}

/// Skip leading environment variable assignments (e.g. `FOO=bar cmd args`).
fn skip_env_assignments(s: &str) -> &str {
    let mut rest = s;
    loop {
        let Some(word) = rest.split_whitespace().next() else {
            return rest;
        };
        if word.contains('=')
            && word
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        {
            rest = rest[word.len()..].trim_start();
        } else {
            return rest;
        }
    }
}

fn is_path_like_argument(arg: &str) -> bool {
    !arg.starts_with('-')
        && !arg.contains("://")
        && (arg.starts_with('/') || arg.starts_with('~') || arg.contains('/') || arg.contains(".."))
}

/// `mkfs` also covers its per-filesystem variants such as `mkfs.ext4`.
fn matches_blocked(blocked: &str, program: &str) -> bool {
    program == blocked
        || program
            .strip_prefix(blocked)
            .is_some_and(|rest| rest.starts_with('.'))
}

impl SandboxPolicy {
    /// Check a full command line. `Err` carries the first violation found.
    pub fn check_command(&self, command: &str) -> Result<(), String> {
        if command.trim().is_empty() {
            return Err("empty command".into());
        }
        if command.contains('`') || command.contains("$(") {
            return Err("command substitution is not allowed".into());
        }
        if command.contains("${") {
            return Err("parameter expansion is not allowed".into());
        }
        if command.contains('\0') {
            return Err("command contains a null byte".into());
        }

        for segment in parse_command(command) {
            if self
                .blocked_commands
                .iter()
                .any(|blocked| matches_blocked(blocked, &segment.program))
            {
                return Err(format!("command `{}` is blocked", segment.program));
            }

            let paths = segment
                .args
                .iter()
                .filter(|arg| is_path_like_argument(arg))
                .chain(segment.redirect_targets.iter());
            for path in paths {
                self.check_path(path)
                    .map_err(|reason| format!("{}: {reason}", segment.program))?;
            }
        }

        Ok(())
    }

    pub fn is_command_allowed(&self, command: &str) -> bool {
        self.check_command(command).is_ok()
    }
}
