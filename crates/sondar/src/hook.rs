//! Hook support: run a shell command at lifecycle points of a suite run.
//!
//! A hook descriptor has the form `[<events>:]<cmd>`, where `<events>` is a
//! comma-separated list of event names (or `*` for all of them) and `<cmd>`
//! is a shell command executed on every matching event. The command receives
//! structured metadata about the current test through `SONDAR_HOOK_*`
//! environment variables.
//!
//! The sole driver of this module is the suite runner in [`crate::harness`],
//! which parses descriptors up front, then notifies one event per lifecycle
//! point.

use crate::result::{SondarError, SondarResult};
use std::process::Command;
use std::str::FromStr;

/// Lifecycle points at which hook commands can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEventKind {
    /// Before the test binary runs any test code
    PreTest,
    /// Before the execution of a subtest
    PreSubtest,
    /// Before the execution of a dynamic subtest
    PreDynSubtest,
    /// After the execution of a dynamic subtest
    PostDynSubtest,
    /// After the execution of a subtest
    PostSubtest,
    /// After the test binary is finished with the test code
    PostTest,
}

impl HookEventKind {
    /// All event kinds, in lifecycle order
    pub const ALL: [Self; 6] = [
        Self::PreTest,
        Self::PreSubtest,
        Self::PreDynSubtest,
        Self::PostDynSubtest,
        Self::PostSubtest,
        Self::PostTest,
    ];

    /// The wire name of the event, as matched in descriptors and exported
    /// in `SONDAR_HOOK_EVENT`
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreTest => "pre-test",
            Self::PreSubtest => "pre-subtest",
            Self::PreDynSubtest => "pre-dyn-subtest",
            Self::PostDynSubtest => "post-dyn-subtest",
            Self::PostSubtest => "post-subtest",
            Self::PostTest => "post-test",
        }
    }

    /// Look up an event kind by wire name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    fn bit(self) -> u16 {
        match self {
            Self::PreTest => 1 << 0,
            Self::PreSubtest => 1 << 1,
            Self::PreDynSubtest => 1 << 2,
            Self::PostDynSubtest => 1 << 3,
            Self::PostSubtest => 1 << 4,
            Self::PostTest => 1 << 5,
        }
    }
}

const ALL_EVENTS_MASK: u16 = (1 << 6) - 1;

/// A parsed hook descriptor: an event filter plus a shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookDescriptor {
    mask: u16,
    command: String,
}

impl HookDescriptor {
    /// Whether this descriptor matches the given event kind
    #[must_use]
    pub fn matches(&self, kind: HookEventKind) -> bool {
        self.mask & kind.bit() != 0
    }

    /// The shell command run on matching events
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl FromStr for HookDescriptor {
    type Err = SondarError;

    /// Parse `[<events>:]<cmd>`.
    ///
    /// Without a `:` the whole string is the command and all events match.
    /// With one, everything before the first `:` must be a comma-separated
    /// list of event names or `*`; a command containing `:` therefore needs
    /// an explicit event list.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((events, command)) = s.split_once(':') else {
            return Ok(Self {
                mask: ALL_EVENTS_MASK,
                command: s.to_string(),
            });
        };

        let mut mask = 0u16;
        for name in events.split(',') {
            if name.is_empty() {
                return Err(SondarError::HookParse {
                    message: "empty name in event descriptor".to_string(),
                });
            }
            if name == "*" {
                mask = ALL_EVENTS_MASK;
                continue;
            }
            let kind = HookEventKind::from_name(name).ok_or_else(|| SondarError::HookParse {
                message: format!("event name {name:?} does not match any event type"),
            })?;
            mask |= kind.bit();
        }

        Ok(Self {
            mask,
            command: command.to_string(),
        })
    }
}

/// Parse a list of raw descriptor strings, failing on the first bad one
pub fn parse_descriptors<S: AsRef<str>>(raw: &[S]) -> SondarResult<Vec<HookDescriptor>> {
    raw.iter().map(|s| s.as_ref().parse()).collect()
}

/// An event to notify hooks about
#[derive(Debug, Clone, Copy)]
pub struct HookEvent<'a> {
    /// The lifecycle point
    pub kind: HookEventKind,
    /// Name of the test, subtest or dynamic subtest the event refers to
    pub target: &'a str,
    /// Result string; only set on `post-*` events
    pub result: Option<&'a str>,
}

impl<'a> HookEvent<'a> {
    /// Create a `pre-*` event
    #[must_use]
    pub fn pre(kind: HookEventKind, target: &'a str) -> Self {
        Self {
            kind,
            target,
            result: None,
        }
    }

    /// Create a `post-*` event carrying a result string
    #[must_use]
    pub fn post(kind: HookEventKind, target: &'a str, result: &'a str) -> Self {
        Self {
            kind,
            target,
            result: Some(result),
        }
    }
}

/// Hook state for one suite run: the descriptors plus the current
/// test/subtest/dynamic-subtest name components.
#[derive(Debug, Default)]
pub struct Hooks {
    descriptors: Vec<HookDescriptor>,
    test: String,
    subtest: String,
    dyn_subtest: String,
}

impl Hooks {
    /// Create hook state from parsed descriptors
    #[must_use]
    pub fn new(descriptors: Vec<HookDescriptor>) -> Self {
        Self {
            descriptors,
            ..Self::default()
        }
    }

    /// Whether any descriptor is registered at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// The full name of the current target, in the format
    /// `sondar@<test>[@<subtest>[@<dyn_subtest>]]`, or the empty string
    /// outside of a test.
    #[must_use]
    pub fn fullname(&self) -> String {
        if self.test.is_empty() {
            return String::new();
        }
        let mut name = format!("sondar@{}", self.test);
        for part in [&self.subtest, &self.dyn_subtest] {
            if part.is_empty() {
                break;
            }
            name.push('@');
            name.push_str(part);
        }
        name
    }

    /// Notify a lifecycle event.
    ///
    /// `pre-*` events first update the corresponding name component, then
    /// run matching commands; `post-*` events run the commands first and
    /// clear the component afterwards, so the command still sees the name
    /// of what just finished. Command exit status is ignored.
    pub fn notify(&mut self, evt: &HookEvent<'_>) {
        match evt.kind {
            HookEventKind::PreTest => self.test = evt.target.to_string(),
            HookEventKind::PreSubtest => self.subtest = evt.target.to_string(),
            HookEventKind::PreDynSubtest => self.dyn_subtest = evt.target.to_string(),
            _ => {}
        }

        if self.descriptors.iter().any(|d| d.matches(evt.kind)) {
            let envs = [
                ("SONDAR_HOOK_EVENT", evt.kind.as_str().to_string()),
                ("SONDAR_HOOK_TEST_FULLNAME", self.fullname()),
                ("SONDAR_HOOK_TEST", self.test.clone()),
                ("SONDAR_HOOK_SUBTEST", self.subtest.clone()),
                ("SONDAR_HOOK_DYN_SUBTEST", self.dyn_subtest.clone()),
                ("SONDAR_HOOK_RESULT", evt.result.unwrap_or("").to_string()),
            ];

            for desc in self.descriptors.iter().filter(|d| d.matches(evt.kind)) {
                let status = Command::new("sh")
                    .arg("-c")
                    .arg(&desc.command)
                    .envs(envs.iter().map(|(k, v)| (*k, v.as_str())))
                    .status();
                if let Err(err) = status {
                    tracing::debug!(command = desc.command, %err, "hook command failed to spawn");
                }
            }
        }

        match evt.kind {
            HookEventKind::PostTest => self.test.clear(),
            HookEventKind::PostSubtest => self.subtest.clear(),
            HookEventKind::PostDynSubtest => self.dyn_subtest.clear(),
            _ => {}
        }
    }
}

/// Detailed user help for the hook option, printed by `--help-hook`
#[must_use]
pub fn help_text(option_name: &str) -> String {
    let mut text = format!(
        "\
The option {option_name} receives as argument a \"hook descriptor\" and allows
the execution of a shell command at different points during execution of
tests. Each such a point is called a \"hook event\".

Examples:

  # Prints hook-specific env vars for every event.
  {option_name} 'printenv | grep ^SONDAR_HOOK_'

  # Equivalent to the above. Useful if the command contains ':'.
  {option_name} '*:printenv | grep ^SONDAR_HOOK_'

  # Adds a line to out.txt containing the result of each test case.
  {option_name} 'post-test:echo $SONDAR_HOOK_TEST_FULLNAME $SONDAR_HOOK_RESULT >> out.txt'

The accepted format for a hook descriptor is `[<events>:]<cmd>`, where:

  - <events> is a comma-separated list of event descriptors, which defines
    the set of events to be tracked. If omitted, all events are tracked.

  - <cmd> is a shell command to be executed on the occurrence of each
    tracked event. If the command contains ':', then passing <events> is
    required, otherwise part of the command would be treated as an event
    descriptor.

An \"event descriptor\" is either the name of an event or the string '*'.
The latter matches all event names. The list of possible event names is
provided below:

"
    );

    for kind in HookEventKind::ALL {
        let desc = match kind {
            HookEventKind::PreTest => "Occurs before a test case starts.",
            HookEventKind::PreSubtest => "Occurs before the execution of a subtest.",
            HookEventKind::PreDynSubtest => "Occurs before the execution of a dynamic subtest.",
            HookEventKind::PostDynSubtest => "Occurs after the execution of a dynamic subtest.",
            HookEventKind::PostSubtest => "Occurs after the execution of a subtest.",
            HookEventKind::PostTest => "Occurs after a test case has finished.",
        };
        text.push_str(&format!("  {}\n  {desc}\n\n", kind.as_str()));
    }

    text.push_str(&format!(
        "\
For each event matched by <events>, <cmd> is executed as a shell command.
The exit status of the command is ignored. The following environment
variables are available to the command:

  SONDAR_HOOK_EVENT
  Name of the current event.

  SONDAR_HOOK_TEST_FULLNAME
  Full name of the test in the format `sondar@<test>[@<subtest>[@<dyn_subtest>]]`.

  SONDAR_HOOK_TEST
  Name of the current test.

  SONDAR_HOOK_SUBTEST
  Name of the current subtest. Will be the empty string if not running a
  subtest.

  SONDAR_HOOK_DYN_SUBTEST
  Name of the current dynamic subtest. Will be the empty string if not
  running a dynamic subtest.

  SONDAR_HOOK_RESULT
  String representing the result of the test/subtest/dynamic subtest.
  Possible values are: SUCCESS, SKIP or FAIL. This is only applicable on
  \"post-*\" events and will be the empty string for other types of events.


Note that {option_name} can be passed multiple times. Each descriptor is
evaluated in turn when matching events and running hook commands.
"
    ));

    text
}
