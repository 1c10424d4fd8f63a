//! Space-filling scan paths
//!
//! Paths are generated as L-systems and walked with a turtle on the integer
//! grid. The Moore curve is a closed loop, so a grid scan ends next to where it
//! started.

use micro3d_core::{Error, Result};

/// Rewrite `axiom` with `rules` for `iterations` rounds
///
/// Rule symbols are dropped from the result, leaving only drawing actions.
pub fn expand_l_system(axiom: &str, rules: &[(char, &str)], iterations: u32) -> Vec<char> {
    let rule_for = |c: char| rules.iter().find(|(symbol, _)| *symbol == c).map(|(_, r)| *r);

    let mut current = axiom.to_string();
    for _ in 0..iterations {
        let mut next = String::with_capacity(current.len() * 4);
        for c in current.chars() {
            match rule_for(c) {
                Some(replacement) => next.push_str(replacement),
                None => next.push(c),
            }
        }
        current = next;
    }

    current.chars().filter(|c| rule_for(*c).is_none()).collect()
}

/// Moore curve actions; order `n` visits `4^(n+1)` cells
pub fn moore_curve(order: u32) -> Vec<char> {
    expand_l_system(
        "LFL+F+LFL",
        &[('L', "-RF+LFL+FR-"), ('R', "+LF-RFR-FL+")],
        order,
    )
}

/// Hilbert curve actions; order `n` visits `4^n` cells
pub fn hilbert_curve(order: u32) -> Vec<char> {
    expand_l_system("A", &[('A', "+BF-AFA-FB+"), ('B', "-AF+BFB+FA-")], order)
}

/// Walk drawing actions from the origin
///
/// `F` moves one cell forward, `+` turns left and `-` turns right by 90°.
/// The turtle starts facing −Y. Each `F` yields the cell it lands on.
pub fn to_unit_xy(actions: &[char]) -> Result<Vec<(i32, i32)>> {
    let mut heading: i32 = 0;
    let (mut x, mut y) = (0i32, 0i32);
    let mut cells = Vec::new();

    for action in actions {
        match action {
            '+' => heading -= 90,
            '-' => heading += 90,
            'F' => {
                match heading.rem_euclid(360) {
                    0 => y -= 1,
                    90 => x += 1,
                    180 => y += 1,
                    _ => x -= 1,
                }
                cells.push((x, y));
            }
            other => return Err(Error::other(format!("Unexpected path action '{}'", other))),
        }
    }
    Ok(cells)
}

/// Grid offsets of a scan: the origin, then every cell of the Moore curve
pub fn grid_offsets(order: u32) -> Result<Vec<(i32, i32)>> {
    let mut offsets = vec![(0, 0)];
    offsets.extend(to_unit_xy(&moore_curve(order))?);
    Ok(offsets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_expand_drops_rule_symbols() {
        assert_eq!(moore_curve(0), vec!['F', '+', 'F', '+', 'F']);
        let actions = moore_curve(2);
        assert!(actions.iter().all(|c| matches!(c, 'F' | '+' | '-')));
    }

    #[test]
    fn test_turtle_heading() {
        assert_eq!(to_unit_xy(&['F']).unwrap(), vec![(0, -1)]);
        assert_eq!(to_unit_xy(&['-', 'F']).unwrap(), vec![(1, 0)]);
        assert_eq!(to_unit_xy(&['+', 'F']).unwrap(), vec![(-1, 0)]);
        assert_eq!(to_unit_xy(&['+', '+', 'F', '-', '-', 'F']).unwrap(), vec![(0, 1), (0, 0)]);
        assert!(to_unit_xy(&['F', 'L']).is_err());
    }

    #[test]
    fn test_moore_grid_is_closed_and_unique() {
        for order in 0..4u32 {
            let offsets = grid_offsets(order).unwrap();
            assert_eq!(offsets.len(), 4usize.pow(order + 1));
            let unique: HashSet<_> = offsets.iter().copied().collect();
            assert_eq!(unique.len(), offsets.len());
            for pair in offsets.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                assert_eq!((a.0 - b.0).abs() + (a.1 - b.1).abs(), 1);
            }
            let last = offsets[offsets.len() - 1];
            assert_eq!(last.0.abs() + last.1.abs(), 1);
        }
    }

    #[test]
    fn test_grid_extent() {
        let offsets = grid_offsets(3).unwrap();
        let min_x = offsets.iter().map(|p| p.0).min().unwrap();
        let max_x = offsets.iter().map(|p| p.0).max().unwrap();
        let min_y = offsets.iter().map(|p| p.1).min().unwrap();
        let max_y = offsets.iter().map(|p| p.1).max().unwrap();
        assert_eq!((min_x, max_x, min_y, max_y), (-8, 7, -15, 0));
    }

    #[test]
    fn test_hilbert_visits_each_cell_once() {
        let mut cells = vec![(0, 0)];
        cells.extend(to_unit_xy(&hilbert_curve(3)).unwrap());
        assert_eq!(cells.len(), 64);
        let unique: HashSet<_> = cells.iter().copied().collect();
        assert_eq!(unique.len(), 64);
    }
}
