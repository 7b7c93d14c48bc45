//! 条件树求值
//!
//! 递归评估 AND/OR 嵌套组，短路求值。叶子级 negate 在组合进
//! 父组之前应用。conditions_checked 计数通过同一个 &mut 引用
//! 贯穿整棵树，每个实际评估过的条件恰好计一次，嵌套组折叠回
//! 父组时不会重复累计。

use crate::context::EvaluationContext;
use crate::evaluator::ConditionEvaluator;
use crate::models::{ConditionGroup, ConditionNode};
use crate::operators::LogicalOperator;

/// 条件树求值器
pub struct ConditionTree;

impl ConditionTree {
    /// 评估条件组；空子节点列表恒为真
    pub fn evaluate(
        group: &ConditionGroup,
        ctx: &EvaluationContext,
        checked: &mut u32,
    ) -> bool {
        if group.children.is_empty() {
            return true;
        }
        match group.operator {
            LogicalOperator::And => {
                // AND: 遇到 false 立即短路
                for child in &group.children {
                    if !Self::evaluate_node(child, ctx, checked) {
                        return false;
                    }
                }
                true
            }
            LogicalOperator::Or => {
                // OR: 遇到 true 立即短路
                for child in &group.children {
                    if Self::evaluate_node(child, ctx, checked) {
                        return true;
                    }
                }
                false
            }
        }
    }

    fn evaluate_node(
        node: &ConditionNode,
        ctx: &EvaluationContext,
        checked: &mut u32,
    ) -> bool {
        match node {
            ConditionNode::Condition(cond) => {
                *checked += 1;
                let matched = ConditionEvaluator::evaluate(cond, ctx);
                if cond.negate() { !matched } else { matched }
            }
            ConditionNode::Group(group) => Self::evaluate(group, ctx, checked),
        }
    }
}
