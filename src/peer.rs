//! Peer store (SPEC_FULL B.4, grounded on `NodeDB::WalkerPeer` /
//! `PeerIns` / `PeerDel`): peer reputation rows, unique by peer-ID,
//! enumerable highest-rating-first.

use crate::codec::{Decode, Encode};
use crate::error::{CodecError, DbResult};
use crate::keys::{peer_key, table_lower_bound, table_upper_bound, Table};
use crate::store::transaction::Transaction;
use crate::types::{PeerData, PeerId, Timestamp};

impl Encode for PeerData {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.id);
        self.rating.encode(out);
        self.address.encode(out);
        self.last_seen.encode(out);
    }
}

impl Decode for PeerData {
    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != 33 + 4 + 8 + 8 {
            return Err(CodecError::TooShort { need: 33 + 4 + 8 + 8, have: buf.len() });
        }
        let id: PeerId = buf[0..33].try_into().unwrap();
        let rating = crate::codec::read_u32_be(&buf[33..37])?;
        let address = crate::codec::read_u64_be(&buf[37..45])?;
        let last_seen = crate::codec::read_u64_be(&buf[45..53])?;
        Ok(PeerData { id, rating, address, last_seen })
    }
}

/// Upserts a peer row by id (spec §3 `Peer`, SPEC_FULL B.4 `PeerIns`).
pub fn peer_ins(tx: &mut Transaction, peer: &PeerData) -> DbResult<()> {
    tx.put(peer_key(&peer.id), peer.to_bytes());
    Ok(())
}

pub fn peer_get(tx: &Transaction, id: &PeerId) -> DbResult<Option<PeerData>> {
    let Some(raw) = tx.get(&peer_key(id))? else { return Ok(None) };
    Ok(Some(PeerData::decode(&raw)?))
}

pub fn peer_del(tx: &mut Transaction, id: &PeerId) -> DbResult<()> {
    tx.remove(peer_key(id));
    Ok(())
}

pub fn peer_set_last_seen(tx: &mut Transaction, id: &PeerId, last_seen: Timestamp) -> DbResult<()> {
    let mut peer = peer_get(tx, id)?.ok_or_else(|| crate::error::DbError::inconsistent("peer_set_last_seen: unknown peer"))?;
    peer.last_seen = last_seen;
    peer_ins(tx, &peer)
}

/// All peers, highest rating first (spec §3 "unique; enum by rating desc").
pub fn enum_peers(tx: &Transaction) -> DbResult<Vec<PeerData>> {
    let lower = table_lower_bound(Table::Peer);
    let upper = table_upper_bound(Table::Peer);
    let mut peers: Vec<PeerData> = tx
        .scan_range(&lower, &upper)?
        .into_iter()
        .map(|(_, v)| PeerData::decode(&v))
        .collect::<Result<_, _>>()?;
    peers.sort_by(|a, b| b.rating.cmp(&a.rating));
    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn mk(id: u8, rating: u32) -> PeerData {
        PeerData { id: [id; 33], rating, address: 0, last_seen: 0 }
    }

    #[test]
    fn enum_peers_orders_by_rating_desc() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        peer_ins(&mut tx, &mk(1, 10)).unwrap();
        peer_ins(&mut tx, &mk(2, 99)).unwrap();
        peer_ins(&mut tx, &mk(3, 50)).unwrap();
        let ratings: Vec<_> = enum_peers(&tx).unwrap().into_iter().map(|p| p.rating).collect();
        assert_eq!(ratings, vec![99, 50, 10]);
    }

    #[test]
    fn ins_is_upsert_by_id() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        peer_ins(&mut tx, &mk(1, 10)).unwrap();
        peer_ins(&mut tx, &mk(1, 20)).unwrap();
        assert_eq!(enum_peers(&tx).unwrap().len(), 1);
        assert_eq!(peer_get(&tx, &[1u8; 33]).unwrap().unwrap().rating, 20);
    }
}
