//! Precompiled matchers for `salt-call` log lines.

use regex::Regex;

/// The three `salt-call -l info` line shapes the log state machine tracks.
#[derive(Debug, Clone)]
pub struct LinePatterns {
    begin: Regex,
    end: Regex,
    exec: Regex,
}

/// A `Running state [X] at time T` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginLine<'a> {
    /// State description.
    pub state: &'a str,
    /// Start time as printed.
    pub time: &'a str,
}

/// A `Completed state [X] at time T (duration_in_ms=D)` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndLine<'a> {
    /// State description.
    pub state: &'a str,
    /// End time as printed.
    pub time: &'a str,
    /// Duration in milliseconds, as printed.
    pub duration_ms: &'a str,
}

/// An `Executing state [X] for [Y]` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecLine<'a> {
    /// State function.
    pub state: &'a str,
    /// Target of the function.
    pub target: &'a str,
}

impl LinePatterns {
    /// Compile the matchers.
    ///
    /// # Errors
    ///
    /// Returns the regex compilation error, which only a broken build can
    /// produce.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            begin: Regex::new(r"\[INFO\s+\] Running state \[(.+)\] at time (.*)$")?,
            end: Regex::new(
                r"\[INFO\s+\] Completed state \[(.*)\] at time (.*) (\()?duration_in_ms=([\d.]+)(\))?$",
            )?,
            exec: Regex::new(r"\[INFO\s+\] Executing state \[(.*)\] for \[(.*)\]$")?,
        })
    }

    /// Match a state-begin line.
    ///
    /// # Examples
    ///
    /// ```
    /// use cast_installer::engine::patterns::LinePatterns;
    ///
    /// let patterns = LinePatterns::new().expect("patterns");
    /// let line = "[INFO    ] Running state [curl] at time 10:00:00.000001";
    /// let begin = patterns.begin(line).expect("begin line");
    /// assert_eq!(begin.state, "curl");
    /// assert_eq!(begin.time, "10:00:00.000001");
    /// ```
    #[must_use]
    pub fn begin<'a>(&self, line: &'a str) -> Option<BeginLine<'a>> {
        let caps = self.begin.captures(line)?;
        Some(BeginLine {
            state: caps.get(1)?.as_str(),
            time: caps.get(2)?.as_str(),
        })
    }

    /// Match a state-end line.
    #[must_use]
    pub fn end<'a>(&self, line: &'a str) -> Option<EndLine<'a>> {
        let caps = self.end.captures(line)?;
        Some(EndLine {
            state: caps.get(1)?.as_str(),
            time: caps.get(2)?.as_str(),
            duration_ms: caps.get(4)?.as_str(),
        })
    }

    /// Match a nested-execution line.
    #[must_use]
    pub fn exec<'a>(&self, line: &'a str) -> Option<ExecLine<'a>> {
        let caps = self.exec.captures(line)?;
        Some(ExecLine {
            state: caps.get(1)?.as_str(),
            target: caps.get(2)?.as_str(),
        })
    }
}
