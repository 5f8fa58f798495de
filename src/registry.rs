use crate::connection::Connection;
use crate::types::HashMap;

#[derive(Debug)]
pub struct Bucket {
    post_nid: usize,
    connections: Vec<Connection>,
}

impl Bucket {
    pub fn post_nid(&self) -> usize {
        self.post_nid
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub(crate) fn connections_mut(&mut self) -> &mut [Connection] {
        &mut self.connections
    }

    fn lower_bound(&self, pre_nid: usize) -> usize {
        self.connections
            .partition_point(|conn| conn.pre_nid() < pre_nid)
    }
}

// buckets keep first insertion order, connections within a bucket are sorted by pre_nid
#[derive(Debug, Default)]
pub struct ConnectionTable {
    buckets: Vec<Bucket>,
    index: HashMap<usize, usize>,
    len: usize,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn bucket(&self, post_nid: usize) -> Option<&Bucket> {
        self.index.get(&post_nid).map(|idx| &self.buckets[*idx])
    }

    pub(crate) fn buckets_mut(&mut self) -> &mut [Bucket] {
        &mut self.buckets
    }

    pub fn find(&self, pre_nid: usize, post_nid: usize, exact: bool) -> Option<usize> {
        let bucket = match self.bucket(post_nid) {
            Some(bucket) => bucket,
            None => return if exact { None } else { Some(0) },
        };

        let pos = bucket.lower_bound(pre_nid);
        if !exact {
            return Some(pos);
        }

        match bucket.connections.get(pos) {
            Some(conn) if conn.pre_nid() == pre_nid => Some(pos),
            _ => None,
        }
    }

    pub fn contains(&self, pre_nid: usize, post_nid: usize) -> bool {
        self.find(pre_nid, post_nid, true).is_some()
    }

    // hands the connection back when the key is already present
    pub fn store(&mut self, conn: Connection) -> Result<(), Connection> {
        let post_nid = conn.post_nid();
        let bucket_idx = match self.index.get(&post_nid) {
            Some(idx) => *idx,
            None => {
                self.buckets.push(Bucket {
                    post_nid,
                    connections: Vec::new(),
                });
                self.index.insert(post_nid, self.buckets.len() - 1);
                self.buckets.len() - 1
            }
        };
        let bucket = &mut self.buckets[bucket_idx];

        let append = bucket
            .connections
            .last()
            .map_or(true, |last| last.pre_nid() < conn.pre_nid());

        if append {
            bucket.connections.push(conn);
        } else {
            let pos = bucket.lower_bound(conn.pre_nid());
            if bucket.connections[pos].pre_nid() == conn.pre_nid() {
                return Err(conn);
            }
            bucket.connections.insert(pos, conn);
        }

        self.len += 1;
        Ok(())
    }

    pub fn get(&self, pre_nid: usize, post_nid: usize) -> Option<&Connection> {
        let pos = self.find(pre_nid, post_nid, true)?;
        self.bucket(post_nid).map(|bucket| &bucket.connections[pos])
    }

    pub fn get_mut(&mut self, pre_nid: usize, post_nid: usize) -> Option<&mut Connection> {
        let pos = self.find(pre_nid, post_nid, true)?;
        let bucket_idx = *self.index.get(&post_nid)?;
        Some(&mut self.buckets[bucket_idx].connections[pos])
    }

    // empty buckets stay in place so the first insertion order survives
    pub fn remove(&mut self, pre_nid: usize, post_nid: usize) -> Option<Connection> {
        let pos = self.find(pre_nid, post_nid, true)?;
        let bucket_idx = *self.index.get(&post_nid)?;
        self.len -= 1;
        Some(self.buckets[bucket_idx].connections.remove(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.buckets.iter().flat_map(|bucket| bucket.connections.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.buckets
            .iter_mut()
            .flat_map(|bucket| bucket.connections.iter_mut())
    }

    pub fn target_connections(&self, post_nid: usize) -> &[Connection] {
        self.bucket(post_nid)
            .map(|bucket| bucket.connections.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn target_connections_mut(&mut self, post_nid: usize) -> &mut [Connection] {
        match self.index.get(&post_nid) {
            Some(idx) => self.buckets[*idx].connections.as_mut_slice(),
            None => &mut [],
        }
    }
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    active: ConnectionTable,
    disabled: ConnectionTable,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn active(&self) -> &ConnectionTable {
        &self.active
    }

    pub(crate) fn active_mut(&mut self) -> &mut ConnectionTable {
        &mut self.active
    }

    pub fn disabled(&self) -> &ConnectionTable {
        &self.disabled
    }

    pub fn find(&self, pre_nid: usize, post_nid: usize, exact: bool) -> Option<usize> {
        self.active.find(pre_nid, post_nid, exact)
    }

    pub fn find_disabled(&self, pre_nid: usize, post_nid: usize, exact: bool) -> Option<usize> {
        self.disabled.find(pre_nid, post_nid, exact)
    }

    pub fn store(&mut self, conn: Connection) -> bool {
        let (pre_nid, post_nid) = conn.key();

        if self.disabled.contains(pre_nid, post_nid) {
            log::warn!(
                "connection {} -> {} is disabled, not storing it again",
                pre_nid,
                post_nid
            );
            return false;
        }

        match self.active.store(conn) {
            Ok(()) => true,
            Err(_) => {
                log::warn!(
                    "connection {} -> {} already exists, ignoring duplicate",
                    pre_nid,
                    post_nid
                );
                false
            }
        }
    }

    pub fn get(&self, pre_nid: usize, post_nid: usize) -> Option<&Connection> {
        self.active.get(pre_nid, post_nid)
    }

    pub fn get_mut(&mut self, pre_nid: usize, post_nid: usize) -> Option<&mut Connection> {
        self.active.get_mut(pre_nid, post_nid)
    }

    pub fn get_disabled(&self, pre_nid: usize, post_nid: usize) -> Option<&Connection> {
        self.disabled.get(pre_nid, post_nid)
    }

    pub fn get_disabled_mut(&mut self, pre_nid: usize, post_nid: usize) -> Option<&mut Connection> {
        self.disabled.get_mut(pre_nid, post_nid)
    }

    pub fn all(&self) -> impl Iterator<Item = &Connection> {
        self.active.iter()
    }

    pub fn all_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.active.iter_mut()
    }

    pub fn all_disabled(&self) -> impl Iterator<Item = &Connection> {
        self.disabled.iter()
    }

    pub fn target_connections(&self, post_nid: usize) -> &[Connection] {
        self.active.target_connections(post_nid)
    }

    pub fn delete(&mut self, pre_nid: usize, post_nid: usize) -> Option<Connection> {
        self.active
            .remove(pre_nid, post_nid)
            .or_else(|| self.disabled.remove(pre_nid, post_nid))
    }

    pub fn move_to_disabled(&mut self, pre_nid: usize, post_nid: usize) -> bool {
        Self::transfer(&mut self.active, &mut self.disabled, pre_nid, post_nid)
    }

    pub fn move_to_active(&mut self, pre_nid: usize, post_nid: usize) -> bool {
        Self::transfer(&mut self.disabled, &mut self.active, pre_nid, post_nid)
    }

    fn transfer(
        from: &mut ConnectionTable,
        to: &mut ConnectionTable,
        pre_nid: usize,
        post_nid: usize,
    ) -> bool {
        let conn = match from.remove(pre_nid, post_nid) {
            Some(conn) => conn,
            None => return false,
        };

        match to.store(conn) {
            Ok(()) => true,
            Err(conn) => {
                log::warn!(
                    "connection {} -> {} is already in the destination table, left in place",
                    pre_nid,
                    post_nid
                );
                // the key was just released by `from`
                if from.store(conn).is_err() {
                    log::error!("connection {} -> {} lost while moving", pre_nid, post_nid);
                }
                false
            }
        }
    }
}
