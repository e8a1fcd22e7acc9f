use std::fmt;

/// A checkpoint of the compiler under test whose behaviour can be graded.
///
/// Declaration order is pipeline order and determines column order within a
/// test category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Tokens,
    Parse,
    Ast,
    Tac,
    Rtl,
    Asm,
}

/// How an invocation under a phase is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// Exit code 0 is the only requirement.
    ExitStatus,
    /// The artifact writes `<input>.<extension>`, which is diffed against the
    /// expected output.
    Output {
        flag: &'static str,
        extension: &'static str,
    },
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Tokens,
        Phase::Parse,
        Phase::Ast,
        Phase::Tac,
        Phase::Rtl,
        Phase::Asm,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Tokens => "TOKENS",
            Phase::Parse => "PARSE",
            Phase::Ast => "AST",
            Phase::Tac => "TAC",
            Phase::Rtl => "RTL",
            Phase::Asm => "ASM",
        }
    }

    pub fn check(self) -> Check {
        let (flag, extension) = match self {
            Phase::Parse => return Check::ExitStatus,
            Phase::Tokens => ("--show-tokens", "toks"),
            Phase::Ast => ("--show-ast", "ast"),
            Phase::Tac => ("--show-tac", "tac"),
            Phase::Rtl => ("--show-rtl", "rtl"),
            Phase::Asm => ("--show-asm", "asm"),
        };
        Check::Output { flag, extension }
    }

    /// Maps an expected-output directory name onto a phase, ignoring case.
    pub fn from_dir_name(name: &str) -> Option<Phase> {
        Phase::ALL
            .into_iter()
            .find(|phase| phase.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
