//! Whole-scan energy computation.

use crate::types::ScanMatrix;

/// Per-row signal energy: the sum of squared samples of each waveform.
///
/// The result is aligned to scan rows — `energies[i]` belongs to
/// `signals.row(i)` — so marker energy extraction can index it with the
/// same signal index used for waveform extraction.
pub fn compute_energy(signals: &ScanMatrix) -> Vec<f64> {
    signals
        .iter_rows()
        .map(|row| row.iter().map(|s| s * s).sum())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScanMatrix;

    #[test]
    fn test_energy_per_row() {
        let m = ScanMatrix::from_rows(2, 3, vec![1.0, 2.0, 3.0, 0.0, -2.0, 0.0]).unwrap();
        let energies = compute_energy(&m);
        assert_eq!(energies, vec![14.0, 4.0]);
    }

    #[test]
    fn test_energy_alignment() {
        let m = ScanMatrix::counting(10, 6);
        let energies = compute_energy(&m);
        assert_eq!(energies.len(), m.rows());
        let row5: f64 = m.row(5).unwrap().iter().map(|s| s * s).sum();
        assert_eq!(energies[5], row5);
    }

    #[test]
    fn test_energy_empty_scan() {
        let m = ScanMatrix::from_rows(0, 0, Vec::new()).unwrap();
        assert!(compute_energy(&m).is_empty());
    }
}
