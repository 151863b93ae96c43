//! 分片任务划分

use std::ops::Range;

/// 单个分片任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceTask {
    /// 分片号，从 1 开始计
    pub slice_no: u64,
    /// 源内的绝对字节区间
    pub range: Range<u64>,
}

impl SliceTask {
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }
}

/// 把 `[0, total_size)` 划分成 `slice_size` 大小的连续分片，末片可以更短
///
/// 返回 `ceil(total_size / slice_size)` 个任务；`total_size` 为 0 时为空。
pub fn plan_slices(total_size: u64, slice_size: u64) -> Vec<SliceTask> {
    let mut tasks = Vec::new();
    if slice_size == 0 {
        return tasks;
    }
    let mut slice_no = 1u64;
    let mut offset = 0u64;
    while offset < total_size {
        let end = (offset + slice_size).min(total_size);
        tasks.push(SliceTask {
            slice_no,
            range: offset..end,
        });
        offset = end;
        slice_no += 1;
    }
    tasks
}
