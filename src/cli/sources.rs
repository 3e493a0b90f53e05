use comfy_table::{Cell, Table};

use crate::descriptor::ALL_SOURCES;
use crate::error::Result;
use crate::fmt::percent;

pub fn run() -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["Key", "Description", "Sheet", "Table", "Unit", "Probabilities"]);
    for kind in ALL_SOURCES {
        let d = kind.descriptor();
        let probabilities: Vec<String> = d
            .probabilities
            .sections
            .iter()
            .map(|(section, p)| format!("{section} {}", percent(*p)))
            .collect();
        table.add_row(vec![
            Cell::new(kind.key()),
            Cell::new(&d.description),
            Cell::new(&d.sheet),
            Cell::new(&d.table),
            Cell::new(format!("x{}", d.unit_scale)),
            Cell::new(probabilities.join(", ")),
        ]);
    }
    println!("{table}");
    Ok(())
}
