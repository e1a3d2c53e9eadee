//! Stable single-column sort

use dps_core::{Result, Table};

/// Sort rows by `column`; ties keep their order and nulls always sort last
pub fn sort_by(table: &Table, column: &str, ascending: bool) -> Result<Table> {
    let keys = table.column(column)?.values;
    let mut order: Vec<usize> = (0..table.num_rows()).collect();
    order.sort_by(|&a, &b| {
        let (x, y) = (&keys[a], &keys[b]);
        match (x.is_null(), y.is_null()) {
            (false, false) if ascending => x.cmp_total(y),
            (false, false) => y.cmp_total(x),
            (null_x, null_y) => null_x.cmp(&null_y),
        }
    });
    if order.iter().enumerate().all(|(i, row)| i == *row) {
        return Ok(table.clone());
    }
    table.take_rows(&order)
}
