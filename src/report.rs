use crate::models::NormalisedRecord;

/// Per-section aggregate for the sync summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionTotals {
    pub section: String,
    pub records: usize,
    pub amount: f64,
    pub weighted_amount: f64,
}

/// Totals per section, in the order sections first appear.
pub fn section_totals(records: &[NormalisedRecord]) -> Vec<SectionTotals> {
    let mut out: Vec<SectionTotals> = Vec::new();
    for r in records {
        let idx = match out.iter().position(|t| t.section == r.section()) {
            Some(i) => i,
            None => {
                out.push(SectionTotals {
                    section: r.section().to_string(),
                    records: 0,
                    amount: 0.0,
                    weighted_amount: 0.0,
                });
                out.len() - 1
            }
        };
        let t = &mut out[idx];
        t.records += 1;
        t.amount += r.amount();
        t.weighted_amount += r.weighted_amount();
    }
    out
}

pub fn grand_total(totals: &[SectionTotals]) -> SectionTotals {
    totals.iter().fold(
        SectionTotals {
            section: "Total".to_string(),
            records: 0,
            amount: 0.0,
            weighted_amount: 0.0,
        },
        |mut acc, t| {
            acc.records += t.records;
            acc.amount += t.amount;
            acc.weighted_amount += t.weighted_amount;
            acc
        },
    )
}
