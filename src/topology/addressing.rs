// Copyright (c) 2025 - Cowboy AI, Inc.
//! Address block allocation
//!
//! Blocks are computed once, at resolution time, over the final topology.
//! Pinned blocks keep their offset; the rest are packed first-fit in
//! [`NodeRole::address_rank`] order around the pinned ones.

use crate::domain::{AddressBlock, NetworkScheme, NodeRole};
use crate::errors::{ConfigError, ConfigResult};

/// Address needs of one node group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRequest {
    /// Group role
    pub role: NodeRole,
    /// Addresses needed (`count * addresses_per_node`)
    pub len: u32,
    /// Pinned start offset
    pub pinned: Option<u32>,
}

/// Allocate one block per request, returned in request order
pub fn allocate_blocks(
    network: &NetworkScheme,
    requests: &[BlockRequest],
) -> ConfigResult<Vec<AddressBlock>> {
    let mut blocks: Vec<Option<AddressBlock>> = vec![None; requests.len()];
    let mut pinned: Vec<(NodeRole, AddressBlock)> = Vec::new();

    for (index, request) in requests.iter().enumerate() {
        let Some(offset) = request.pinned else {
            continue;
        };
        let block = AddressBlock::new(offset, request.len);
        ensure_in_range(network, request.role, &block)?;
        if let Some((other, _)) = pinned.iter().find(|(_, existing)| existing.overlaps(&block)) {
            return Err(ConfigError::OverlappingAddressRanges {
                first: *other,
                second: request.role,
            });
        }
        pinned.push((request.role, block));
        blocks[index] = Some(block);
    }

    let mut packed: Vec<usize> = (0..requests.len())
        .filter(|i| requests[*i].pinned.is_none())
        .collect();
    packed.sort_by_key(|i| (requests[*i].role.address_rank(), *i));

    // Every request restarts from the lowest usable offset, so gaps left in
    // front of pinned blocks are still filled.
    let mut placed: Vec<AddressBlock> = pinned.iter().map(|(_, block)| *block).collect();
    for index in packed {
        let request = requests[index];
        let mut block = AddressBlock::new(network.first_usable_offset(), request.len);
        while let Some(taken) = placed.iter().find(|taken| taken.overlaps(&block)) {
            block = AddressBlock::new(taken.end(), request.len);
        }
        ensure_in_range(network, request.role, &block)?;
        placed.push(block);
        blocks[index] = Some(block);
    }

    Ok(blocks.into_iter().flatten().collect())
}

fn ensure_in_range(network: &NetworkScheme, role: NodeRole, block: &AddressBlock) -> ConfigResult<()> {
    let fits = block.offset.checked_add(block.len).is_some() && network.contains_block(block);
    if fits {
        Ok(())
    } else {
        Err(ConfigError::BlockOutOfRange {
            role,
            subnet: network.to_string(),
            start: block.offset,
            end: block.end(),
        })
    }
}
