//! 迁移任务描述及其文本语法。
//!
//! ```text
//! task  ::= ε | '+' | '-' | '*' | '/' | 'cp'
//!         | '==' NUMBER | '!=' NUMBER
//!         | 'p' NUMBER            (秒，非负)
//! ```
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{multispace0, multispace1};
use nom::combinator::{all_consuming, map, map_res, value};
use nom::number::complete::double;
use nom::sequence::{delimited, preceded};
use nom::{IResult, Parser};
use thiserror::Error;

use crate::net::structure::Value;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskParseError {
    #[error("unrecognized task {0:?}")]
    Invalid(String),
}

/// Operation a transition performs over its ordered input values (S-model).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Task {
    /// No computation: forwards the first value.
    #[default]
    Gate,
    Add,
    Subtract,
    Multiply,
    Divide,
    Equals(Value),
    NotEquals(Value),
    Copy,
    /// Identity whose output transits wait before travelling.
    Delay(Duration),
}

impl Task {
    pub fn is_comparison(&self) -> bool {
        matches!(self, Task::Equals(_) | Task::NotEquals(_))
    }

    pub fn output_delay(&self) -> Option<Duration> {
        match self {
            Task::Delay(delay) => Some(*delay),
            _ => None,
        }
    }
}

fn task(input: &str) -> IResult<&str, Task> {
    alt((
        map(preceded((tag("=="), multispace0), double), Task::Equals),
        map(preceded((tag("!="), multispace0), double), Task::NotEquals),
        map_res(preceded((tag("p"), multispace1), double), |secs: f64| {
            Duration::try_from_secs_f64(secs).map(Task::Delay)
        }),
        value(Task::Copy, tag("cp")),
        value(Task::Add, tag("+")),
        value(Task::Subtract, tag("-")),
        value(Task::Multiply, tag("*")),
        value(Task::Divide, tag("/")),
    ))
    .parse(input)
}

impl FromStr for Task {
    type Err = TaskParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Task::Gate);
        }
        all_consuming(delimited(multispace0, task, multispace0))
            .parse(s)
            .map(|(_, task)| task)
            .map_err(|_| TaskParseError::Invalid(s.to_string()))
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Gate => Ok(()),
            Task::Add => f.write_str("+"),
            Task::Subtract => f.write_str("-"),
            Task::Multiply => f.write_str("*"),
            Task::Divide => f.write_str("/"),
            Task::Equals(k) => write!(f, "== {k}"),
            Task::NotEquals(k) => write!(f, "!= {k}"),
            Task::Copy => f.write_str("cp"),
            Task::Delay(delay) => write!(f, "p {}", delay.as_secs_f64()),
        }
    }
}
