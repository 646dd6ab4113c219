use crate::combat::unit::HeroId;
use crate::net::wire::PartyMemberRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct PartyMember {
    pub hero_id: HeroId,
    pub name: String,
    pub level: u32,
}

impl From<&PartyMemberRecord> for PartyMember {
    fn from(record: &PartyMemberRecord) -> Self {
        Self {
            hero_id: record.hero_id,
            name: record.name.clone(),
            level: record.level,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingParty {
    pub proposed_by: HeroId,
    pub members: Vec<PartyMember>,
}

/// Client-local, non-authoritative party membership, reconstructed purely
/// from replayed party-up / party-invite-accepted events. Remote proposals
/// stay pending until a local confirmation step commits them.
#[derive(Debug, Default)]
pub struct PartyRoster {
    committed: Vec<PartyMember>,
    pending: Option<PendingParty>,
}

impl PartyRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn members(&self) -> &[PartyMember] {
        &self.committed
    }

    pub fn pending(&self) -> Option<&PendingParty> {
        self.pending.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.pending.is_none()
    }

    /// Records a party-up proposal. Re-applying the same proposal replaces
    /// the pending slot with identical contents, so replay is harmless.
    pub fn propose(&mut self, proposed_by: HeroId, members: Vec<PartyMember>) {
        self.pending = Some(PendingParty {
            proposed_by,
            members: dedup_by_hero(members),
        });
    }

    /// Adds one accepted member. Joins the committed roster when one exists,
    /// otherwise the pending proposal; with neither, it opens a new pending
    /// proposal from that hero. Returns false when the hero was already
    /// listed.
    pub fn accept_member(&mut self, member: PartyMember) -> bool {
        if !self.committed.is_empty() {
            if contains_hero(&self.committed, member.hero_id) {
                return false;
            }
            self.committed.push(member);
            return true;
        }
        match &mut self.pending {
            Some(pending) => {
                if contains_hero(&pending.members, member.hero_id) {
                    return false;
                }
                pending.members.push(member);
                true
            }
            None => {
                self.pending = Some(PendingParty {
                    proposed_by: member.hero_id,
                    members: vec![member],
                });
                true
            }
        }
    }

    /// The local confirmation step: commits the pending proposal. Returns
    /// false when there was nothing to confirm.
    pub fn confirm_pending(&mut self) -> bool {
        let Some(pending) = self.pending.take() else {
            return false;
        };
        for member in pending.members {
            if !contains_hero(&self.committed, member.hero_id) {
                self.committed.push(member);
            }
        }
        true
    }

    pub fn decline_pending(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn clear(&mut self) {
        self.committed.clear();
        self.pending = None;
    }
}

fn contains_hero(members: &[PartyMember], hero_id: HeroId) -> bool {
    members.iter().any(|member| member.hero_id == hero_id)
}

fn dedup_by_hero(members: Vec<PartyMember>) -> Vec<PartyMember> {
    let mut seen = Vec::new();
    for member in members {
        if !contains_hero(&seen, member.hero_id) {
            seen.push(member);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(hero_id: HeroId, name: &str) -> PartyMember {
        PartyMember {
            hero_id,
            name: name.to_string(),
            level: 1,
        }
    }

    #[test]
    fn proposal_stays_pending_until_confirmed() {
        let mut roster = PartyRoster::new();
        roster.propose(2, vec![member(2, "ren"), member(3, "kit")]);

        assert!(roster.members().is_empty());
        assert!(roster.pending().is_some());

        assert!(roster.confirm_pending());
        assert_eq!(roster.members().len(), 2);
        assert!(roster.pending().is_none());
        assert!(!roster.confirm_pending());
    }

    #[test]
    fn replaying_the_same_proposal_is_idempotent() {
        let mut roster = PartyRoster::new();
        let members = vec![member(2, "ren"), member(3, "kit")];
        roster.propose(2, members.clone());
        let first = roster.pending().cloned();
        roster.propose(2, members);

        assert_eq!(roster.pending().cloned(), first);
    }

    #[test]
    fn accept_member_joins_committed_roster_without_duplicates() {
        let mut roster = PartyRoster::new();
        roster.propose(2, vec![member(2, "ren")]);
        roster.confirm_pending();

        roster.accept_member(member(3, "kit"));
        roster.accept_member(member(3, "kit"));

        assert_eq!(roster.members().len(), 2);
        assert_eq!(roster.members()[1].hero_id, 3);
    }

    #[test]
    fn accept_without_party_opens_a_pending_proposal() {
        let mut roster = PartyRoster::new();
        roster.accept_member(member(4, "ash"));

        let pending = roster.pending().expect("pending");
        assert_eq!(pending.proposed_by, 4);
        assert_eq!(pending.members.len(), 1);
    }

    #[test]
    fn decline_discards_the_pending_proposal() {
        let mut roster = PartyRoster::new();
        roster.propose(2, vec![member(2, "ren")]);

        assert!(roster.decline_pending());
        assert!(roster.is_empty());
        assert!(!roster.decline_pending());
    }

    #[test]
    fn proposal_membership_is_ordered_and_deduplicated() {
        let mut roster = PartyRoster::new();
        roster.propose(
            2,
            vec![member(2, "ren"), member(3, "kit"), member(2, "ren-again")],
        );

        let pending = roster.pending().expect("pending");
        assert_eq!(pending.members.len(), 2);
        assert_eq!(pending.members[0].name, "ren");
        assert_eq!(pending.members[1].name, "kit");
    }
}
