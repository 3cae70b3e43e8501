//! 窗口平铺
//!
//! 把 AI 窗口按网格排在可用区域内，相邻窗口之间留固定间隙，互不重叠。

use crate::models::Rect;

const GAP: u32 = 10;

/// 窗口数量对应的网格（列, 行）
pub fn grid_for(count: usize) -> (u32, u32) {
    match count {
        0..=2 => (2, 1),
        3..=4 => (2, 2),
        5..=6 => (3, 2),
        _ => (3, 3),
    }
}

/// 第 `index` 个窗口（共 `count` 个）的位置
///
/// 超出网格容量的窗口循环使用已有格子。
pub fn tile(area: Rect, count: usize, index: usize) -> Rect {
    let (cols, rows) = grid_for(count);
    let slot = (index as u32) % (cols * rows);
    let col = slot % cols;
    let row = slot / cols;

    let cell_width = area.width.saturating_sub(GAP * (cols - 1)) / cols;
    let cell_height = area.height.saturating_sub(GAP * (rows - 1)) / rows;

    Rect::new(
        area.left + (col * (cell_width + GAP)) as i32,
        area.top + (row * (cell_height + GAP)) as i32,
        cell_width.max(1),
        cell_height.max(1),
    )
}
