use crate::layout::grid::{GridPosition, WorkArea};

/// Visual balance: how close the area-weighted centre of mass sits to the work-area centre.
///
/// `1 − distance / halfDiagonal`, clamped to 0.0–1.0. Advisory only; the refinement loop
/// uses it as the last tie-breaker when ranking proposals.
pub fn balance_score<'a>(positions: impl IntoIterator<Item = &'a GridPosition>, area: &WorkArea) -> f64 {
    let mut mass = 0.0;
    let mut moment_x = 0.0;
    let mut moment_y = 0.0;
    for pos in positions {
        let weight = pos.area() as f64;
        let (cx, cy) = pos.center();
        mass += weight;
        moment_x += cx * weight;
        moment_y += cy * weight;
    }

    let half_diagonal = (area.width as f64).hypot(area.height as f64) / 2.0;
    if mass <= 0.0 || half_diagonal <= 0.0 {
        return 1.0;
    }

    let (ax, ay) = area.center();
    let distance = (moment_x / mass - ax).hypot(moment_y / mass - ay);
    (1.0 - distance / half_diagonal).clamp(0.0, 1.0)
}
