use serde::{Deserialize, Serialize};

/// 推荐列表响应
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralListResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub unfiltered: Option<ReferralPage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReferralPage {
    #[serde(default)]
    pub referrals: Vec<Referral>,
}

/// 单条推荐记录
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    /// 服务端 ID，类型不固定（字符串或数字），原样回传
    pub id: serde_json::Value,
    #[serde(default)]
    pub can_claim: bool,
}

impl ReferralListResponse {
    /// 可领取的推荐记录；请求未成功时为空
    pub fn claimable(&self) -> Vec<&Referral> {
        if !self.success {
            return Vec::new();
        }
        self.unfiltered
            .iter()
            .flat_map(|page| page.referrals.iter())
            .filter(|r| r.can_claim)
            .collect()
    }
}

/// 领取请求体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest<'a> {
    pub referral_id: &'a serde_json::Value,
    pub all: bool,
}
