//! Line-oriented counter commands
//!
//! Provides a small text protocol over the registry:
//! - INCR: Record an event, optionally with a time and a value
//! - COUNTS / SUMS / SQUARES: Raw accumulator ranges
//! - MEANS / DEVIATIONS / VARIANCES: Derived statistics
//! - STATS: Every statistic per bucket
//! - DELETE: Drop a counter
//! - POLICY: Show or change the session policy
//!
//! Options use `key:value` arguments, e.g.
//! `INCR checkout value:42 at:2024-05-01T10:00:00Z`. Time arguments accept
//! RFC 3339, Unix milliseconds, `now`, or `*` for an open bound.

use chrono::{DateTime, TimeZone, Utc};
use std::fmt::Write as _;

use super::error::CounterError;
use super::granularity::Granularity;
use super::increment::WriteOutcome;
use super::kind::StatisticKind;
use super::policy::{ConsistencyLevel, Policy, WriteSynchronicity};
use super::query::{BucketStatistics, DerivedSeries, RawSeries};
use super::registry::CounterRegistry;

/// Derived statistic selected by a query command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derived {
    Means,
    Deviations,
    Variances,
}

/// Which end of a query range a time argument sits at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Start,
    Finish,
}

/// Parsed counter command
#[derive(Debug, Clone, PartialEq)]
pub enum CounterCommand {
    /// INCR <name> [at:<time>] [value:<n>]
    Increment {
        name: String,
        at: Option<DateTime<Utc>>,
        value: Option<i64>,
    },

    /// COUNTS|SUMS|SQUARES <name> <granularity> <start> <finish>
    Raw {
        name: String,
        kind: StatisticKind,
        granularity: Granularity,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
    },

    /// MEANS|DEVIATIONS|VARIANCES <name> <granularity> <start> <finish>
    Derived {
        name: String,
        statistic: Derived,
        granularity: Granularity,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
    },

    /// STATS <name> <granularity> <start> <finish>
    Stats {
        name: String,
        granularity: Granularity,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
    },

    /// DELETE <name>
    Delete { name: String },

    /// POLICY [consistency:<level>] [mode:<sync|async>]
    Policy {
        consistency: Option<ConsistencyLevel>,
        write_synchronicity: Option<WriteSynchronicity>,
    },
}

impl CounterCommand {
    /// Parse a command from whitespace-separated arguments
    pub fn parse(args: &[&str]) -> Result<CounterCommand, String> {
        let Some(first) = args.first() else {
            return Err("No command provided".to_string());
        };

        let cmd = first.to_uppercase();
        let args = &args[1..];

        match cmd.as_str() {
            "INCR" => Self::parse_increment(args),
            "COUNTS" => Self::parse_raw(StatisticKind::Count, args),
            "SUMS" => Self::parse_raw(StatisticKind::Sum, args),
            "SQUARES" => Self::parse_raw(StatisticKind::SumOfSquares, args),
            "MEANS" => Self::parse_derived(&cmd, Derived::Means, args),
            "DEVIATIONS" => Self::parse_derived(&cmd, Derived::Deviations, args),
            "VARIANCES" => Self::parse_derived(&cmd, Derived::Variances, args),
            "STATS" => {
                let (name, granularity, start, finish) = Self::parse_range(&cmd, args)?;
                Ok(CounterCommand::Stats {
                    name,
                    granularity,
                    start,
                    finish,
                })
            }
            "DELETE" => match args {
                [name] => Ok(CounterCommand::Delete {
                    name: name.to_string(),
                }),
                _ => Err("DELETE requires exactly one counter name".to_string()),
            },
            "POLICY" => Self::parse_policy(args),
            _ => Err(format!("Unknown command: {}", cmd)),
        }
    }

    fn parse_increment(args: &[&str]) -> Result<CounterCommand, String> {
        let Some((name, options)) = args.split_first() else {
            return Err("INCR requires counter name".to_string());
        };

        let mut at = None;
        let mut value = None;
        for option in options {
            match option.split_once(':') {
                Some(("at", raw)) => at = Some(parse_time(raw, Bound::Start)?),
                Some(("value", raw)) => {
                    value = Some(
                        raw.parse::<i64>()
                            .map_err(|_| format!("Invalid value: {}", raw))?,
                    )
                }
                _ => return Err(format!("Unknown INCR option: {}", option)),
            }
        }

        Ok(CounterCommand::Increment {
            name: name.to_string(),
            at,
            value,
        })
    }

    fn parse_raw(kind: StatisticKind, args: &[&str]) -> Result<CounterCommand, String> {
        let (name, granularity, start, finish) = Self::parse_range(kind.code(), args)?;
        Ok(CounterCommand::Raw {
            name,
            kind,
            granularity,
            start,
            finish,
        })
    }

    fn parse_derived(
        cmd: &str,
        statistic: Derived,
        args: &[&str],
    ) -> Result<CounterCommand, String> {
        let (name, granularity, start, finish) = Self::parse_range(cmd, args)?;
        Ok(CounterCommand::Derived {
            name,
            statistic,
            granularity,
            start,
            finish,
        })
    }

    fn parse_range(
        cmd: &str,
        args: &[&str],
    ) -> Result<(String, Granularity, DateTime<Utc>, DateTime<Utc>), String> {
        let [name, granularity, start, finish] = args else {
            return Err(format!(
                "{} requires <name> <granularity> <start> <finish>",
                cmd.to_uppercase()
            ));
        };
        let granularity = granularity
            .parse::<Granularity>()
            .map_err(|e| e.to_string())?;
        Ok((
            name.to_string(),
            granularity,
            parse_time(start, Bound::Start)?,
            parse_time(finish, Bound::Finish)?,
        ))
    }

    fn parse_policy(args: &[&str]) -> Result<CounterCommand, String> {
        let mut consistency = None;
        let mut write_synchronicity = None;
        for option in args {
            match option.split_once(':') {
                Some(("consistency", raw)) => {
                    consistency = Some(raw.parse().map_err(|e: CounterError| e.to_string())?)
                }
                Some(("mode", raw)) => {
                    write_synchronicity =
                        Some(raw.parse().map_err(|e: CounterError| e.to_string())?)
                }
                _ => return Err(format!("Unknown POLICY option: {}", option)),
            }
        }
        Ok(CounterCommand::Policy {
            consistency,
            write_synchronicity,
        })
    }
}

fn parse_time(raw: &str, bound: Bound) -> Result<DateTime<Utc>, String> {
    match raw {
        "now" => Ok(Utc::now()),
        "*" => Ok(match bound {
            Bound::Start => DateTime::<Utc>::MIN_UTC,
            Bound::Finish => DateTime::<Utc>::MAX_UTC,
        }),
        _ => {
            if let Ok(millis) = raw.parse::<i64>() {
                return Utc
                    .timestamp_millis_opt(millis)
                    .single()
                    .ok_or_else(|| format!("Timestamp out of range: {}", raw));
            }
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| format!("Invalid time: {}", raw))
        }
    }
}

/// Result of executing a command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    /// Write acknowledged or delete applied
    Ok,
    /// Write handed off without waiting
    Queued,
    Raw(RawSeries),
    Derived(DerivedSeries),
    Stats(Vec<(DateTime<Utc>, BucketStatistics)>),
    Policy(Policy),
    Error(String),
}

impl CommandReply {
    /// Render as plain text, one bucket per line
    pub fn render(&self) -> String {
        match self {
            CommandReply::Ok => "OK".to_string(),
            CommandReply::Queued => "QUEUED".to_string(),
            CommandReply::Raw(series) => render_series(series.iter().map(|(t, v)| (t, v.to_string()))),
            CommandReply::Derived(series) => {
                render_series(series.iter().map(|(t, v)| (t, format!("{:.6}", v))))
            }
            CommandReply::Stats(rows) => render_series(rows.iter().map(|(t, s)| {
                (
                    t,
                    format!(
                        "count={} sum={} squares={} mean={:.6} variance={:.6} deviation={:.6}",
                        s.count, s.sum, s.sum_of_squares, s.mean, s.variance, s.deviation
                    ),
                )
            })),
            CommandReply::Policy(policy) => format!(
                "consistency={} mode={}",
                policy.consistency, policy.write_synchronicity
            ),
            CommandReply::Error(e) => format!("ERR {}", e),
        }
    }
}

fn render_series<'a>(rows: impl Iterator<Item = (&'a DateTime<Utc>, String)>) -> String {
    let mut out = String::new();
    for (bucket, value) in rows {
        let _ = writeln!(out, "{} {}", bucket.to_rfc3339(), value);
    }
    if out.is_empty() {
        "(empty)".to_string()
    } else {
        out.trim_end().to_string()
    }
}

/// Executes commands against a registry with a mutable session policy
pub struct CounterCommandExecutor {
    registry: CounterRegistry,
    policy: Policy,
}

impl CounterCommandExecutor {
    pub fn new(registry: CounterRegistry) -> Self {
        let policy = registry.policy();
        CounterCommandExecutor { registry, policy }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Execute a command; failures become `CommandReply::Error`
    pub async fn execute(&mut self, cmd: CounterCommand) -> CommandReply {
        match self.try_execute(cmd).await {
            Ok(reply) => reply,
            Err(e) => CommandReply::Error(e.to_string()),
        }
    }

    async fn try_execute(&mut self, cmd: CounterCommand) -> Result<CommandReply, CounterError> {
        match cmd {
            CounterCommand::Increment { name, at, value } => {
                let counter = self.registry.counter_with_policy(&name, self.policy)?;
                let outcome = match at {
                    Some(at) => counter.increment(at, value).await?,
                    None => counter.increment_now(value).await?,
                };
                Ok(match outcome {
                    WriteOutcome::Acknowledged => CommandReply::Ok,
                    WriteOutcome::Pending(_) => CommandReply::Queued,
                })
            }

            CounterCommand::Raw {
                name,
                kind,
                granularity,
                start,
                finish,
            } => {
                let counter = self.registry.counter_with_policy(&name, self.policy)?;
                let series = counter.raw_range(kind, granularity, start, finish).await?;
                Ok(CommandReply::Raw(series))
            }

            CounterCommand::Derived {
                name,
                statistic,
                granularity,
                start,
                finish,
            } => {
                let counter = self.registry.counter_with_policy(&name, self.policy)?;
                let series = match statistic {
                    Derived::Means => counter.means(granularity, start, finish).await?,
                    Derived::Deviations => counter.deviations(granularity, start, finish).await?,
                    Derived::Variances => counter.variances(granularity, start, finish).await?,
                };
                Ok(CommandReply::Derived(series))
            }

            CounterCommand::Stats {
                name,
                granularity,
                start,
                finish,
            } => {
                let counter = self.registry.counter_with_policy(&name, self.policy)?;
                let stats = counter.statistics(granularity, start, finish).await?;
                Ok(CommandReply::Stats(stats.into_iter().collect()))
            }

            CounterCommand::Delete { name } => {
                let counter = self.registry.counter_with_policy(&name, self.policy)?;
                counter.delete().await?;
                Ok(CommandReply::Ok)
            }

            CounterCommand::Policy {
                consistency,
                write_synchronicity,
            } => {
                if let Some(level) = consistency {
                    self.policy.consistency = level;
                }
                if let Some(mode) = write_synchronicity {
                    self.policy.write_synchronicity = mode;
                }
                Ok(CommandReply::Policy(self.policy))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCounterStore;
    use std::sync::Arc;

    fn executor() -> CounterCommandExecutor {
        CounterCommandExecutor::new(CounterRegistry::with_defaults(Arc::new(
            InMemoryCounterStore::new(),
        )))
    }

    async fn run(executor: &mut CounterCommandExecutor, line: &str) -> CommandReply {
        let args: Vec<&str> = line.split_whitespace().collect();
        executor.execute(CounterCommand::parse(&args).unwrap()).await
    }

    #[test]
    fn test_parse_increment() {
        let cmd =
            CounterCommand::parse(&["incr", "checkout", "value:42", "at:2024-05-01T10:00:00Z"])
                .unwrap();
        match cmd {
            CounterCommand::Increment { name, at, value } => {
                assert_eq!(name, "checkout");
                assert_eq!(value, Some(42));
                assert_eq!(at, Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()));
            }
            _ => panic!("Expected Increment command"),
        }
    }

    #[test]
    fn test_parse_range_with_open_bounds() {
        let cmd = CounterCommand::parse(&["MEANS", "latency", "day", "*", "1700000000000"]).unwrap();
        match cmd {
            CounterCommand::Derived {
                statistic,
                granularity,
                start,
                finish,
                ..
            } => {
                assert_eq!(statistic, Derived::Means);
                assert_eq!(granularity, Granularity::Day);
                assert_eq!(start, DateTime::<Utc>::MIN_UTC);
                assert_eq!(finish.timestamp_millis(), 1_700_000_000_000);
            }
            _ => panic!("Expected Derived command"),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(CounterCommand::parse(&[]).is_err());
        assert!(CounterCommand::parse(&["INCR"]).is_err());
        assert!(CounterCommand::parse(&["INCR", "x", "value:abc"]).is_err());
        assert!(CounterCommand::parse(&["COUNTS", "x", "weekly", "*", "*"]).is_err());
        assert!(CounterCommand::parse(&["COUNTS", "x", "day"]).is_err());
        assert!(CounterCommand::parse(&["POLICY", "consistency:most"]).is_err());
        assert!(CounterCommand::parse(&["FLUSHALL"]).is_err());
    }

    #[tokio::test]
    async fn test_execute_stats_roundtrip() {
        let mut executor = executor();
        for v in [2, 4, 6] {
            let line = format!("INCR latency value:{} at:2024-05-01T0{}:00:00Z", v, v);
            assert_eq!(run(&mut executor, &line).await, CommandReply::Ok);
        }

        let reply = run(&mut executor, "STATS latency daily * *").await;
        let CommandReply::Stats(rows) = reply else {
            panic!("Expected Stats reply");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.count, 3);
        assert_eq!(rows[0].1.sum_of_squares, 56);
        assert!((rows[0].1.deviation - 2.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_execute_policy_and_delete() {
        let mut executor = executor();
        let reply = run(&mut executor, "POLICY consistency:one mode:async").await;
        assert_eq!(
            reply.render(),
            "consistency=one mode=asynchronous".to_string()
        );

        assert_eq!(run(&mut executor, "INCR hits").await, CommandReply::Queued);

        run(&mut executor, "POLICY mode:sync").await;
        assert_eq!(run(&mut executor, "INCR misses").await, CommandReply::Ok);
        assert_eq!(run(&mut executor, "DELETE misses").await, CommandReply::Ok);
        assert_eq!(
            run(&mut executor, "COUNTS misses all * *").await.render(),
            "(empty)"
        );
    }

    #[tokio::test]
    async fn test_errors_are_replies() {
        let mut executor = executor();
        let reply = run(&mut executor, "INCR big value:9223372036854775807").await;
        assert!(reply.render().starts_with("ERR value"));
    }
}
