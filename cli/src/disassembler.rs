//! cli/src/disassembler.rs
//! Tabular bytecode listing for `shroud disasm`.

use comfy_table::{CellAlignment, ContentArrangement, Table, presets};
use shroud_core::{
    Build, ShroudResult,
    bytecode::disasm::{self, ListingLine},
};

pub struct DisasmOptions {
    /// Show the encoded opcode byte next to each mnemonic.
    pub bytes: bool,
    /// Plain text instead of a table.
    pub raw: bool,
}

pub fn render(build: &Build, options: &DisasmOptions) -> ShroudResult<String> {
    if options.raw {
        return disasm::disassemble(build);
    }
    let lines = disasm::listing(build)?;
    let mut out = format!(
        "; {} bytes, {} instructions, {} constants, opcode key {:#04x}\n",
        build.code.len(),
        lines.len(),
        build.constants.len(),
        build.opcode_map.key()
    );
    for text in listing_table(&lines, options.bytes).to_string().lines() {
        out.push_str(text.trim_end());
        out.push('\n');
    }
    Ok(out)
}

fn listing_table(lines: &[ListingLine], bytes: bool) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::NOTHING).set_content_arrangement(ContentArrangement::Disabled);
    let mut header = vec!["label", "offset"];
    if bytes {
        header.push("byte");
    }
    header.extend(["op", "operands", "comment"]);
    table.set_header(header);

    for line in lines {
        let mut row = vec![
            line.label.as_ref().map(|l| format!("{}:", l)).unwrap_or_default(),
            format!("{:06}", line.offset),
        ];
        if bytes {
            row.push(format!("{:02x}", line.code));
        }
        row.push(line.mnemonic.to_string());
        row.push(line.operands.clone());
        row.push(line.comment.as_ref().map(|c| format!("; {}", c)).unwrap_or_default());
        table.add_row(row);
    }
    if let Some(column) = table.column_mut(1) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    table
}
