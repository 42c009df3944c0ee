use tracing::{debug, trace};

use crate::{
    cqi::{CqiLevel, CqiReport, bytes_per_rb},
    packet::{Packet, UserId},
    queue::PacketQueue,
};

// ==========================================
// 机会式调度：按 CQI 从高到低贪心装帧
// ==========================================

/// 单个用户在本帧里拿到的份额 (分不到 RB 的用户也会留一条 0 记录)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub user: UserId,
    pub level: CqiLevel,
    pub bytes_per_rb: u32,
    pub bytes: u64,
    pub rbs: u32,
    pub served: Vec<Packet>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub slot: u64,
    pub capacity_rbs: u32,
    pub remaining_rbs: u32,
    pub grants: Vec<Grant>, // 按排名顺序
    pub total_bytes: u64,
}

impl Frame {
    pub fn used_rbs(&self) -> u32 {
        self.capacity_rbs - self.remaining_rbs
    }

    pub fn served_packets(&self) -> impl Iterator<Item = &Packet> {
        self.grants.iter().flat_map(|g| g.served.iter())
    }

    pub fn into_served(self) -> impl Iterator<Item = Packet> {
        self.grants.into_iter().flat_map(|g| g.served.into_iter())
    }
}

/// CQI 降序，同 CQI 按用户号升序，排序结果与上报到达顺序无关
pub fn rank(reports: &mut [CqiReport]) {
    reports.sort_unstable_by(|a, b| b.level.cmp(&a.level).then(a.user.cmp(&b.user)));
}

/// `reports` 必须已经 [`rank`] 过；`queues` 以用户号为下标
pub fn allocate<Q: PacketQueue>(
    slot: u64,
    reports: &[CqiReport],
    queues: &mut [Q],
    capacity_rbs: u32,
) -> Frame {
    let mut remaining_rbs = capacity_rbs;
    let mut total_bytes = 0u64;
    let mut grants = Vec::with_capacity(reports.len());

    for report in reports {
        let dim_rb = bytes_per_rb(report.level);
        let mut grant = Grant {
            user: report.user,
            level: report.level,
            bytes_per_rb: dim_rb,
            bytes: 0,
            rbs: 0,
            served: Vec::new(),
        };

        // 无效 CQI：本帧跳过，不占 RB
        if dim_rb == 0 {
            trace!(user = report.user, level = report.level, "invalid cqi, skipped");
            grants.push(grant);
            continue;
        }

        let Some(queue) = queues.get_mut(report.user) else {
            grants.push(grant);
            continue;
        };

        let frame_bytes = remaining_rbs as u64 * dim_rb as u64;
        let mut available = frame_bytes;

        // 队头阻塞：队头放不下就停，后面更小的包本帧也不看
        while let Some(head) = queue.peek() {
            let size = head.size as u64;
            if size > available {
                trace!(user = report.user, size, available, "head of line does not fit");
                break;
            }
            let Some(pkt) = queue.dequeue() else {
                break;
            };
            available -= size;
            total_bytes += size;
            grant.served.push(pkt);
        }

        // RB 不可分：用了一点也算一整块
        let used_bytes = frame_bytes - available;
        let used_rbs = used_bytes.div_ceil(dim_rb as u64) as u32;
        remaining_rbs -= used_rbs;

        grant.bytes = used_bytes;
        grant.rbs = used_rbs;
        debug!(
            slot,
            user = report.user,
            level = report.level,
            bytes = used_bytes,
            rbs = used_rbs,
            remaining_rbs,
            "user served"
        );
        grants.push(grant);
    }

    Frame {
        slot,
        capacity_rbs,
        remaining_rbs,
        grants,
        total_bytes,
    }
}
