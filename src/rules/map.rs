use crate::domain::PacketMeta;
use crate::sets::MapInfo;

use super::config::MapFlags;

/// Rewrite packet metadata from a map-set entry.
///
/// Only the fields enabled in `flags` and present in `info` change. The
/// queue mapping is applied only when the egress device has more TX
/// queues than the mapped index.
pub fn apply(meta: &mut PacketMeta, egress_tx_queues: Option<u16>, info: &MapInfo, flags: MapFlags) {
    if flags.mark {
        if let Some((value, mask)) = info.mark {
            meta.mark = (meta.mark & !mask) ^ value;
        }
    }

    if flags.priority {
        if let Some(priority) = info.priority {
            meta.priority = priority;
        }
    }

    if flags.queue {
        if let (Some(queue), Some(queues)) = (info.queue, egress_tx_queues) {
            if queues > queue {
                meta.queue_mapping = queue;
            }
        }
    }
}
