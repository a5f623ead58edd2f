//! 迁移任务引擎：对有序输入值求值，并给出是否输出以及输出什么。
use std::collections::VecDeque;
use std::time::Duration;

use indexmap::IndexMap;

use crate::net::ids::PlaceId;
use crate::net::structure::{PendingToken, Routing, SmartToken, TokenOrder, Value};
use crate::net::task::Task;

/// Raw result of a task over its input values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskOutcome {
    Value(Value),
    /// Comparison result, `1`/`0` as a boolean.
    Verdict(bool),
    Failed,
}

/// What a firing emits on every output arc.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Emit {
        token: SmartToken,
        delay: Option<Duration>,
    },
    /// Comparison result not routed by the pass flags.
    Suppress,
    /// Task failed (division by zero, no operands).
    Failed,
}

/// Orders pending values. With a token order, values are grouped per source
/// place and taken round-robin over the order until every named queue is
/// empty; values from unnamed places follow in arrival order.
pub fn order_values(pending: &[PendingToken], order: Option<&TokenOrder>) -> Vec<Value> {
    let value_of = |pending: &PendingToken| pending.token.unwrap_or_default().value();
    let Some(order) = order.filter(|order| !order.is_empty()) else {
        return pending.iter().map(value_of).collect();
    };

    let mut queues: IndexMap<PlaceId, VecDeque<Value>> =
        order.places().iter().map(|place| (*place, VecDeque::new())).collect();
    let mut leftovers = Vec::new();
    for token in pending {
        match queues.get_mut(&token.source) {
            Some(queue) => queue.push_back(value_of(token)),
            None => leftovers.push(value_of(token)),
        }
    }

    let mut ordered = Vec::with_capacity(pending.len());
    loop {
        let mut took = false;
        for place in order.places() {
            if let Some(value) = queues.get_mut(place).and_then(VecDeque::pop_front) {
                ordered.push(value);
                took = true;
            }
        }
        if !took {
            break;
        }
    }
    ordered.extend(leftovers);
    ordered
}

pub fn evaluate(task: &Task, values: &[Value]) -> TaskOutcome {
    let Some((&first, rest)) = values.split_first() else {
        return TaskOutcome::Failed;
    };
    match task {
        Task::Gate | Task::Copy | Task::Delay(_) => TaskOutcome::Value(first),
        Task::Add => TaskOutcome::Value(values.iter().sum()),
        Task::Multiply => TaskOutcome::Value(values.iter().product()),
        Task::Subtract => TaskOutcome::Value(rest.iter().fold(first, |acc, v| acc - v)),
        Task::Divide => {
            if rest.iter().any(|v| *v == 0.0) {
                TaskOutcome::Failed
            } else {
                TaskOutcome::Value(rest.iter().fold(first, |acc, v| acc / v))
            }
        }
        Task::Equals(k) => TaskOutcome::Verdict(first == *k),
        Task::NotEquals(k) => TaskOutcome::Verdict(first != *k),
    }
}

/// Applies routing flags to the task outcome.
pub fn decide(task: &Task, routing: Routing, values: &[Value]) -> Decision {
    let computed = match evaluate(task, values) {
        TaskOutcome::Failed => return Decision::Failed,
        TaskOutcome::Value(value) => value,
        TaskOutcome::Verdict(verdict) => {
            let pass = if verdict {
                routing.contains(Routing::PASS_ON_TRUE)
            } else {
                routing.contains(Routing::PASS_ON_FALSE)
            };
            if !pass {
                return Decision::Suppress;
            }
            if verdict { 1.0 } else { 0.0 }
        }
    };
    let value = if routing.contains(Routing::PASS_PREVIOUS_VALUE) {
        values[0]
    } else {
        computed
    };
    Decision::Emit {
        token: SmartToken::new(value),
        delay: task.output_delay(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(source: u32, value: Value) -> PendingToken {
        PendingToken {
            source: PlaceId::new(source),
            units: 1,
            token: Some(SmartToken::new(value)),
        }
    }

    #[test]
    fn arithmetic_tasks() {
        assert_eq!(evaluate(&Task::Add, &[2.0, 3.0, 4.0]), TaskOutcome::Value(9.0));
        assert_eq!(evaluate(&Task::Subtract, &[10.0, 3.0]), TaskOutcome::Value(7.0));
        assert_eq!(evaluate(&Task::Multiply, &[2.0, 3.0, 4.0]), TaskOutcome::Value(24.0));
        assert_eq!(evaluate(&Task::Divide, &[10.0, 4.0]), TaskOutcome::Value(2.5));
        assert_eq!(evaluate(&Task::Divide, &[10.0, 0.0]), TaskOutcome::Failed);
    }

    #[test]
    fn odd_operand_counts_do_not_panic() {
        assert_eq!(evaluate(&Task::Subtract, &[4.0]), TaskOutcome::Value(4.0));
        assert_eq!(evaluate(&Task::Subtract, &[10.0, 3.0, 2.0]), TaskOutcome::Value(5.0));
        assert_eq!(evaluate(&Task::Divide, &[8.0]), TaskOutcome::Value(8.0));
        assert_eq!(evaluate(&Task::Add, &[]), TaskOutcome::Failed);
    }

    #[test]
    fn equality_routing() {
        let routing = Routing::PASS_ON_TRUE;
        assert!(matches!(
            decide(&Task::Equals(5.0), routing, &[5.0]),
            Decision::Emit { token, delay: None } if token.value() == 1.0
        ));
        assert_eq!(decide(&Task::Equals(5.0), routing, &[3.0]), Decision::Suppress);
    }

    #[test]
    fn pass_previous_value_forwards_first_input() {
        let routing = Routing::PASS_ON_FALSE | Routing::PASS_PREVIOUS_VALUE;
        assert_eq!(
            decide(&Task::NotEquals(3.0), routing, &[3.0]),
            Decision::Emit {
                token: SmartToken::new(3.0),
                delay: None
            }
        );
        assert_eq!(decide(&Task::NotEquals(3.0), routing, &[4.0]), Decision::Suppress);
    }

    #[test]
    fn delay_task_carries_its_delay() {
        let delay = Duration::from_secs(2);
        assert_eq!(
            decide(&Task::Delay(delay), Routing::default(), &[7.0]),
            Decision::Emit {
                token: SmartToken::new(7.0),
                delay: Some(delay)
            }
        );
        assert_eq!(decide(&Task::Divide, Routing::default(), &[1.0, 0.0]), Decision::Failed);
    }

    #[test]
    fn order_spec_sequences_values() {
        // A (p#1) arrives before B (p#2); order "B,A"
        let arrivals = [pending(1, 3.0), pending(2, 10.0)];
        let order = TokenOrder(vec![PlaceId::new(2), PlaceId::new(1)]);
        assert_eq!(order_values(&arrivals, Some(&order)), vec![10.0, 3.0]);
        assert_eq!(order_values(&arrivals, None), vec![3.0, 10.0]);
    }

    #[test]
    fn order_spec_round_robin_with_leftovers() {
        let arrivals = [
            pending(1, 1.0),
            pending(9, 99.0),
            pending(1, 2.0),
            pending(2, 10.0),
        ];
        let order = TokenOrder(vec![PlaceId::new(2), PlaceId::new(1)]);
        assert_eq!(
            order_values(&arrivals, Some(&order)),
            vec![10.0, 1.0, 2.0, 99.0]
        );
    }
}
