//! 退避策略 - 流程层
//!
//! 把原先散落在重试循环里的 sleep / break 判断收敛为一个纯函数：
//! 输入尝试次数和失败分类，输出"等多久"或"放弃"。策略本身不碰时钟，
//! 等待由调用方执行，因此测试不需要真实延迟。
//!
//! 两类失败的恢复手段不同：
//! - 服务瞬时故障靠时间自愈 → 指数退避，超过上限放弃
//! - 解析失败近似确定性 → 换一种提示词变体重试，按次数封顶

use std::time::Duration;

use crate::error::{BackoffDecision, FailureKind};

/// 瞬时退避的等待时长增长方式
///
/// 不同数据集任务对限流的容忍度不同：翻倍增长退得慢，适合偶发限流；
/// 自乘增长几步内就触顶放弃，适合希望尽快写哨兵跳过的任务
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffGrowth {
    /// 每次等待翻倍：base × 2^attempt
    Doubling,
    /// 每次等待自乘：base, base², base⁴, ...
    Squaring,
}

/// 退避策略
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// 瞬时故障首次等待秒数
    pub base_secs: u64,
    /// 等待时长上限（秒），超过即放弃
    pub ceiling_secs: u64,
    /// 瞬时等待的增长方式
    pub growth: BackoffGrowth,
    /// 每个对话变体允许的解析失败次数
    pub max_parse_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_secs: 2,
            ceiling_secs: 16,
            growth: BackoffGrowth::Doubling,
            max_parse_attempts: 3,
        }
    }
}

impl BackoffPolicy {
    /// 计算下一步退避决策
    ///
    /// # 参数
    /// - `attempt`: 同类失败已发生的次数（从 0 开始）
    /// - `kind`: 失败分类
    /// - `variant_count`: 可用对话变体数量（解析失败的预算乘数）
    pub fn decide(
        &self,
        attempt: u32,
        kind: FailureKind,
        variant_count: usize,
    ) -> BackoffDecision {
        match kind {
            FailureKind::Transient => self.transient_delay(attempt),
            FailureKind::Parse => self.parse_decision(attempt, variant_count),
        }
    }

    /// 瞬时故障的等待时长，超过上限放弃
    fn transient_delay(&self, attempt: u32) -> BackoffDecision {
        let delay = match self.growth {
            // checked_shl 只保护移位量，不保护数值溢出，这里用 checked_mul
            BackoffGrowth::Doubling => 1u64
                .checked_shl(attempt)
                .and_then(|factor| self.base_secs.checked_mul(factor))
                .unwrap_or(u64::MAX),
            BackoffGrowth::Squaring => {
                // base 低于 2 时自乘不增长，按 2 处理保证有限步内触顶
                let mut delay = self.base_secs.max(2);
                for _ in 0..attempt {
                    delay = delay.checked_mul(delay).unwrap_or(u64::MAX);
                }
                delay
            }
        };
        if delay > self.ceiling_secs {
            BackoffDecision::GiveUp
        } else {
            BackoffDecision::Wait(Duration::from_secs(delay))
        }
    }

    /// 解析失败按次数封顶：预算 = 每变体次数 × 变体数，预算内立即重试
    fn parse_decision(&self, attempt: u32, variant_count: usize) -> BackoffDecision {
        let budget = self.max_parse_attempts * variant_count.max(1) as u32;
        if attempt < budget {
            BackoffDecision::Wait(Duration::ZERO)
        } else {
            BackoffDecision::GiveUp
        }
    }
}
