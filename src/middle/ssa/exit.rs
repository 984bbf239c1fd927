use crate::{
    error::internal_error,
    middle::{
        cfg::Cfg,
        lir::{DataLocation, FunctionData, Instruction, Label, Operand, Register, Temporary},
        ssa::moves::sequentialize_moves,
    },
};

/// Removes every phi node of `cfg`.
///
/// The phis of a block are replaced, for each predecessor, by the copies
/// they perform along that edge. The copies are placed in a new block split
/// into the edge, so they only run when control actually flows through it.
/// Edges along which every copy is a no-op are left alone.
///
/// Before allocation the copies are between temporaries. Once `function`
/// has been allocated they are between the chosen locations instead, which
/// lets copies between coalesced locations disappear.
pub fn exit_ssa(cfg: &mut Cfg, function: &mut FunctionData) {
    let mut split = 0;

    for label in cfg.labels() {
        if !cfg.block(label).has_phis() {
            continue;
        }

        let predecessors: Vec<Label> = cfg.predecessors(label).iter().copied().collect();
        for predecessor in predecessors {
            let copies: Vec<(Temporary, Temporary)> = cfg
                .block(label)
                .phis()
                .map(|phi| match phi.sources.get(&predecessor) {
                    Some(source) => (phi.destination, *source),
                    None => internal_error!(
                        "phi {} in {label} has no source for {predecessor}",
                        phi.destination
                    ),
                })
                .collect();

            let instructions = if function.is_allocated() {
                location_moves(&copies, function)
            } else {
                temporary_moves(&copies, function)
            };

            if !instructions.is_empty() {
                cfg.split_edge(predecessor, label, instructions, function);
                split += 1;
            }
        }

        cfg.take_phis(label);
    }

    log::debug!("{}: split {split} edges leaving SSA", function.symbol_name);
}

fn temporary_moves(
    copies: &[(Temporary, Temporary)],
    function: &mut FunctionData,
) -> Vec<Instruction> {
    sequentialize_moves(copies, || function.fresh_temporary())
        .into_iter()
        .map(|(destination, source)| Instruction::Move {
            destination: destination.into(),
            source: source.into(),
        })
        .collect()
}

fn location_moves(copies: &[(Temporary, Temporary)], function: &FunctionData) -> Vec<Instruction> {
    let located = |t: Temporary| match function.location(t) {
        Some(location) => location,
        None => internal_error!("temporary {t} has no location"),
    };

    let copies: Vec<(DataLocation, DataLocation)> = copies
        .iter()
        .map(|&(destination, source)| (located(destination), located(source)))
        .collect();

    // s3 breaks cycles, s1 carries memory to memory copies
    let swap = DataLocation::Register(Register::S3);

    sequentialize_moves(&copies, || swap)
        .into_iter()
        .flat_map(|(destination, source)| match (destination, source) {
            (DataLocation::Register(d), DataLocation::Register(s)) => vec![Instruction::Move {
                destination: d.into(),
                source: s.into(),
            }],
            (DataLocation::Register(d), DataLocation::Memory(offset)) => vec![Instruction::Load {
                destination: d.into(),
                offset,
            }],
            (DataLocation::Memory(offset), DataLocation::Register(s)) => {
                vec![Instruction::Store {
                    source: s.into(),
                    offset,
                }]
            }
            (DataLocation::Memory(to), DataLocation::Memory(from)) => vec![
                Instruction::Load {
                    destination: Operand::Register(Register::S1),
                    offset: from,
                },
                Instruction::Store {
                    source: Operand::Register(Register::S1),
                    offset: to,
                },
            ],
        })
        .collect()
}
