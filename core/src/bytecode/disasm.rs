//! Human-readable listing of a build.

use std::collections::BTreeMap;

use crate::error::ShroudResult;

use super::{Build, Opcode};

/// One rendered instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLine {
    pub offset: usize,
    /// Label name when some jump targets this instruction.
    pub label: Option<String>,
    pub code: u8,
    pub mnemonic: &'static str,
    pub operands: String,
    pub comment: Option<String>,
}

pub fn listing(build: &Build) -> ShroudResult<Vec<ListingLine>> {
    let instructions = build.decode()?;

    // First pass: name every jump target in offset order.
    let mut labels: BTreeMap<usize, String> = BTreeMap::new();
    for target in build.jump_targets() {
        labels.entry(target).or_default();
    }
    for (n, name) in labels.values_mut().enumerate() {
        *name = format!("L{}", n);
    }

    // Second pass: render, resolving targets and constant previews.
    let mut out = Vec::with_capacity(instructions.len());
    for ins in instructions {
        let operands = match ins.opcode {
            op if op.is_jump() => {
                let target = ins.operands[0] as usize;
                labels.get(&target).cloned().unwrap_or_else(|| target.to_string())
            }
            Opcode::Call => format!(
                "{} {} {}",
                ins.operands[0], ins.operands[1], ins.operands[2]
            ),
            _ => ins.operands.iter().map(u32::to_string).collect::<Vec<_>>().join(" "),
        };
        let comment = match ins.opcode {
            Opcode::LoadK | Opcode::GetGlobal | Opcode::SetGlobal => {
                build.constants.get(ins.operands[0] as usize).map(|entry| {
                    let value = entry.decrypt();
                    if entry.is_encrypted() { format!("{} (enc)", value) } else { value.to_string() }
                })
            }
            Opcode::GetLocal | Opcode::SetLocal => build.local_names.get(ins.operands[0] as usize).cloned(),
            Opcode::Call => Some(match ins.operands[2] {
                0 => format!("{} args{}, keep all", ins.operands[0], if ins.operands[1] == 1 { "+..." } else { "" }),
                c => format!("{} args{}, {} results", ins.operands[0], if ins.operands[1] == 1 { "+..." } else { "" }, c - 1),
            }),
            _ => None,
        };
        out.push(ListingLine {
            offset: ins.offset,
            label: labels.get(&ins.offset).cloned(),
            code: build.code[ins.offset],
            mnemonic: ins.opcode.mnemonic(),
            operands,
            comment,
        });
    }
    Ok(out)
}

/// Plain-text listing, one instruction per line.
pub fn disassemble(build: &Build) -> ShroudResult<String> {
    let mut out = String::new();
    out.push_str(&format!(
        "; {} bytes, {} constants, {} locals, opcode key {:#04x}\n",
        build.code.len(),
        build.constants.len(),
        build.local_count(),
        build.opcode_map.key()
    ));
    for line in listing(build)? {
        if let Some(label) = &line.label {
            out.push_str(&format!("{}:\n", label));
        }
        let mut text = format!("{:06}  {:02x}  {:<10} {}", line.offset, line.code, line.mnemonic, line.operands);
        if let Some(comment) = &line.comment {
            text = format!("{:<40} ; {}", text, comment);
        }
        out.push_str(text.trim_end());
        out.push('\n');
    }
    Ok(out)
}
