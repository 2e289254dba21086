use clap::{ArgAction, Parser};

/// Flags
///
/// Command line switches. Accepts the single-dash spelling (`-debug`) as well as
/// `--debug`, see [`normalize_args`]. Each switch also takes an explicit value
/// (`-debug=false`).
#[derive(Parser, Debug, Clone, Default, PartialEq)]
#[command(name = "hello-auth", about = "Demo web app with login, registration and account recovery")]
pub struct Flags {
    /// Enable debug logging
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, require_equals = true,
          default_value_t = false, default_missing_value = "true")]
    pub debug: bool,

    /// Log the user store on every request
    #[arg(long = "debugdb", action = ArgAction::Set, num_args = 0..=1, require_equals = true,
          default_value_t = false, default_missing_value = "true")]
    pub debug_db: bool,

    /// Log the page data built for every request
    #[arg(long = "debugctx", action = ArgAction::Set, num_args = 0..=1, require_equals = true,
          default_value_t = false, default_missing_value = "true")]
    pub debug_ctx: bool,

    /// Answer with JSON instead of HTML pages and redirects
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, require_equals = true,
          default_value_t = false, default_missing_value = "true")]
    pub api: bool,
}

impl Flags {
    /// Parses flags from `args`, program name first.
    pub fn parse_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self::parse_from(normalize_args(args))
    }
}

/// Rewrites `-name` to `--name` so both spellings reach clap. Short flags like `-h` and
/// everything after a bare `--` are left alone.
pub fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut passthrough = false;
    args.into_iter()
        .map(|arg| {
            if passthrough {
                return arg;
            }
            if arg == "--" {
                passthrough = true;
                return arg;
            }
            if arg.len() > 2 && arg.starts_with('-') && !arg.starts_with("--") {
                format!("-{arg}")
            } else {
                arg
            }
        })
        .collect()
}
