//! Tactic table — (context, persona, condition) → tactic, and the localized
//! rendering of each tactic. First matching rule wins.

use nudge_core::{
    LocalizedMessage, NudgeContent, NudgeContext, NudgePayload, NudgeType, Persona, Priority,
};

/// Risk level at which a SAVER sees loss aversion instead of peer proof.
pub const HIGH_RISK_THRESHOLD: f64 = 85.0;
/// VND per cup of coffee, for salience comparisons.
pub const COFFEE_PRICE_VND: f64 = 50_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tactic {
    /// "Top 10% of investors are taking profits here."
    TopInvestors,
    /// "20% downside" caution for risk-averse users.
    DownsideWarning,
    /// "85% of investors with your profile..."
    PeerProfile,
    /// Savings expressed as cups of coffee.
    CoffeeSalience,
    /// "X% toward your savings goal."
    SavingsGradient,
    /// "90% of the way to your badge."
    BadgeGradient,
    /// Live count of matching behavior in the trailing window.
    LiveSocialProof,
}

#[derive(Debug, Clone, Copy)]
enum PersonaRule {
    Any,
    Is(Persona),
}

impl PersonaRule {
    fn matches(&self, persona: Option<Persona>) -> bool {
        match self {
            PersonaRule::Any => true,
            PersonaRule::Is(p) => persona == Some(*p),
        }
    }
}

struct TacticRule {
    context: NudgeContext,
    persona: PersonaRule,
    when: fn(&NudgePayload) -> bool,
    tactic: Tactic,
}

fn always(_: &NudgePayload) -> bool {
    true
}

fn high_risk(payload: &NudgePayload) -> bool {
    payload.risk_level.is_some_and(|r| r >= HIGH_RISK_THRESHOLD)
}

fn rules() -> &'static [TacticRule] {
    use std::sync::OnceLock;
    static RULES: OnceLock<Vec<TacticRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            TacticRule {
                context: NudgeContext::InvestmentDecision,
                persona: PersonaRule::Is(Persona::Hunter),
                when: always,
                tactic: Tactic::TopInvestors,
            },
            TacticRule {
                context: NudgeContext::InvestmentDecision,
                persona: PersonaRule::Is(Persona::Saver),
                when: high_risk,
                tactic: Tactic::DownsideWarning,
            },
            TacticRule {
                context: NudgeContext::InvestmentDecision,
                persona: PersonaRule::Any,
                when: always,
                tactic: Tactic::PeerProfile,
            },
            TacticRule {
                context: NudgeContext::Budgeting,
                persona: PersonaRule::Is(Persona::Hunter),
                when: always,
                tactic: Tactic::CoffeeSalience,
            },
            TacticRule {
                context: NudgeContext::Budgeting,
                persona: PersonaRule::Any,
                when: always,
                tactic: Tactic::SavingsGradient,
            },
            TacticRule {
                context: NudgeContext::StreakWarning,
                persona: PersonaRule::Any,
                when: always,
                tactic: Tactic::BadgeGradient,
            },
            TacticRule {
                context: NudgeContext::SocialProofRealtime,
                persona: PersonaRule::Any,
                when: always,
                tactic: Tactic::LiveSocialProof,
            },
        ]
    })
}

/// Look up the tactic for a context. `None` for unrecognized contexts.
pub fn resolve_tactic(
    context: &NudgeContext,
    persona: Option<Persona>,
    payload: &NudgePayload,
) -> Option<Tactic> {
    rules()
        .iter()
        .find(|r| r.context == *context && r.persona.matches(persona) && (r.when)(payload))
        .map(|r| r.tactic)
}

impl Tactic {
    /// Tactics that need a live behavior count before rendering.
    pub fn needs_live_count(&self) -> bool {
        matches!(self, Tactic::LiveSocialProof)
    }

    /// Render localized content. `None` when there is nothing truthful to say
    /// (a live count of zero).
    pub fn render(
        &self,
        payload: &NudgePayload,
        live_count: Option<usize>,
    ) -> Option<NudgeContent> {
        let (nudge_type, priority, message) = match self {
            Tactic::TopInvestors => (
                NudgeType::SocialProof,
                Priority::High,
                LocalizedMessage::new(
                    "Thách thức: 10% nhà đầu tư hàng đầu đang chốt lời tại đây. Bạn có muốn theo kịp họ?",
                    "Challenge: The top 10% of investors are taking profits here. Can you keep up?",
                    "挑战：前 10% 的投资者都在这里获利。你能跟上吗？",
                ),
            ),
            Tactic::DownsideWarning => (
                NudgeType::LossAversion,
                Priority::High,
                LocalizedMessage::new(
                    "Thận trọng: Khoản đầu tư này có rủi ro giảm 20% vốn chỉ trong 1 tuần.",
                    "Caution: This investment carries a 20% downside. You could lose 20% of your capital in a single week.",
                    "注意：这项投资存在 20% 的下行风险，您可能在一周内损失 20% 的资本。",
                ),
            ),
            Tactic::PeerProfile => (
                NudgeType::SocialProof,
                Priority::Medium,
                LocalizedMessage::new(
                    "85% nhà đầu tư có hồ sơ giống bạn chọn danh mục đa dạng hóa này.",
                    "85% of investors with your profile choose this diversified portfolio.",
                    "85% 的具有您背景的投资者选择了这个多元化的投资组合。",
                ),
            ),
            Tactic::CoffeeSalience => {
                let cups = coffee_cups(payload);
                (
                    NudgeType::Salience,
                    Priority::Low,
                    LocalizedMessage::new(
                        format!("Tiết kiệm khoản này tương đương với {cups} ly cà phê mỗi tháng."),
                        format!("Saving this is equivalent to {cups} cups of coffee per month."),
                        format!("节省这笔钱相当于每月 {cups} 杯咖啡。"),
                    ),
                )
            }
            Tactic::SavingsGradient => {
                let pct = savings_progress(payload);
                (
                    NudgeType::GoalGradient,
                    Priority::High,
                    LocalizedMessage::new(
                        format!("Bạn đã đi được {pct}% chặng đường đến mục tiêu tiết kiệm. Tiếp tục nhé!"),
                        format!("You're {pct}% toward your savings goal. Keep going!"),
                        format!("您已完成储蓄目标的 {pct}%。继续加油！"),
                    ),
                )
            }
            Tactic::BadgeGradient => (
                NudgeType::GoalGradient,
                Priority::High,
                LocalizedMessage::new(
                    "Bạn đã đi được 90% chặng đường để nhận huy hiệu 'Nhà đầu tư kỷ luật'!",
                    "You are 90% of the way to earning the 'Disciplined Investor' badge!",
                    "您已经完成了获得“自律投资者”勋章的 90%！",
                ),
            ),
            Tactic::LiveSocialProof => {
                let count = live_count.filter(|c| *c > 0)?;
                (
                    NudgeType::SocialProof,
                    Priority::Medium,
                    LocalizedMessage::new(
                        format!("{count} người bạn đang tích cực học tập trong 24h qua. Đừng bỏ lỡ nhé!"),
                        format!("{count} friends have been actively learning in the last 24h. Don't miss out!"),
                        format!("在过去的 24 小时内，有 {count} 位朋友在积极学习。不要错过！"),
                    ),
                )
            }
        };
        Some(NudgeContent {
            nudge_type,
            message,
            priority,
        })
    }
}

fn coffee_cups(payload: &NudgePayload) -> u64 {
    let amount = payload.amount.unwrap_or(0.0).max(0.0);
    (amount / COFFEE_PRICE_VND).floor() as u64
}

/// Explicit progress wins; otherwise each cup saved counts as 10%.
fn savings_progress(payload: &NudgePayload) -> u64 {
    let pct = payload
        .goal_progress
        .unwrap_or_else(|| coffee_cups(payload) as f64 * 10.0);
    pct.clamp(0.0, 100.0).round() as u64
}
