//! Battle lobby and round state machine
//!
//! `BattleSession` is the client-local view of a shared room. It consumes poll
//! results and game events, and produces the writes to send back. It never
//! touches the network itself, so every transition is driven by explicit
//! timestamps (unix seconds).

use crate::board::Board;
use crate::game::Game;
use crate::room::{BattleRoom, PlayerPatch, PlayerRecord, RoomPatch, RoomState, Slot};
use crate::score::Score;
use crate::sync::{AttackAccounting, SyncRequest, Throttle};
use crate::transport::{RoomTransport, TransportError};
use crate::wire::{decode_board, encode_board};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("room is full")]
    RoomFull,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Current wall clock time in unix seconds
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// What joining a room should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Create the room (or overwrite an abandoned one) as host
    Create,
    /// Take over a stale host record, keeping the guest
    Host,
    Guest,
}

impl Claim {
    pub fn slot(self) -> Slot {
        match self {
            Claim::Create | Claim::Host => Slot::P1,
            Claim::Guest => Slot::P2,
        }
    }
}

/// First come first served: host if the host slot is free or stale, else
/// guest if that slot is free or stale
pub fn choose_slot(room: Option<&BattleRoom>, now: f64, stale_after: f64) -> Result<Claim, JoinError> {
    let Some(room) = room else {
        return Ok(Claim::Create);
    };
    if room.is_stale(now, stale_after) {
        return Ok(Claim::Create);
    }

    let free = |slot: Slot| {
        room.player(slot)
            .is_none_or(|record| record.is_stale(now, stale_after))
    };
    if free(Slot::P1) {
        Ok(Claim::Host)
    } else if free(Slot::P2) {
        Ok(Claim::Guest)
    } else {
        Err(JoinError::RoomFull)
    }
}

/// Read the room and claim a slot in it
pub async fn join_room<T: RoomTransport>(transport: &T, now: f64, stale_after: Duration) -> Result<Slot, JoinError> {
    let room = transport.get_room().await?;
    let claim = choose_slot(room.as_ref(), now, stale_after.as_secs_f64())?;

    match claim {
        Claim::Create => {
            transport.put_room(&BattleRoom::hosted(now)).await?;
        }
        Claim::Host => {
            transport
                .patch_player(Slot::P1, &fresh_record_patch(now))
                .await?;
            transport
                .patch_room(&RoomPatch {
                    state: Some(RoomState::Waiting),
                    countdown_start: None,
                    last_update: Some(now),
                })
                .await?;
        }
        Claim::Guest => {
            transport
                .patch_player(Slot::P2, &fresh_record_patch(now))
                .await?;
        }
    }

    info!("joined room as {} ({:?})", claim.slot(), claim);
    Ok(claim.slot())
}

fn fresh_record_patch(now: f64) -> PlayerPatch {
    let record = PlayerRecord::joined(now);
    PlayerPatch {
        ready: Some(record.ready),
        grid: Some(record.grid),
        attack_queue: Some(record.attack_queue),
        score: Some(record.score),
        stomps: Some(record.stomps),
        match_wins: Some(record.match_wins),
        losses: Some(record.losses),
        last_seen: Some(record.last_seen),
        seq: Some(record.seq),
    }
}

/// Session timing
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub countdown: Duration,
    pub poll_interval: Duration,
    pub push_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(3),
            poll_interval: Duration::from_millis(700),
            push_interval: Duration::from_millis(500),
        }
    }
}

/// Things the game loop must react to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    CountdownStarted,
    /// Reset the local game and start playing
    RoundStarted,
    /// Reset the local game and go back to the lobby
    RoundEnded,
    /// The opponent lost a round
    Won,
}

/// Last known state of the other player
#[derive(Debug, Clone, Default)]
pub struct OpponentView {
    pub present: bool,
    pub ready: bool,
    pub board: Board,
    pub score: u64,
    pub stomps: u32,
    pub match_wins: u32,
    pub losses: u32,
}

pub struct BattleSession {
    slot: Slot,
    config: SessionConfig,
    phase: RoomState,
    /// Local time the countdown started
    countdown_start: f64,
    ready: bool,
    match_wins: u32,
    losses: u32,
    /// After losing as guest, the room still says playing until the host
    /// notices. Ignore that until waiting shows up or a round that started
    /// after `lost_at` does.
    awaiting_waiting: bool,
    lost_at: f64,
    accounting: AttackAccounting,
    seq: u64,
    opponent: OpponentView,
    opponent_seq: u64,
    opponent_losses: Option<u32>,
    poll_throttle: Throttle,
    push_throttle: Throttle,
    outbox: Vec<SyncRequest>,
    events: Vec<SessionEvent>,
}

impl BattleSession {
    /// Write sequence numbers continue from the join time in milliseconds
    pub fn new(slot: Slot, config: SessionConfig, now: f64) -> Self {
        Self {
            slot,
            phase: RoomState::Waiting,
            countdown_start: 0.0,
            ready: false,
            match_wins: 0,
            losses: 0,
            awaiting_waiting: false,
            lost_at: 0.0,
            accounting: AttackAccounting::new(),
            seq: (now * 1000.0) as u64,
            opponent: OpponentView::default(),
            opponent_seq: 0,
            opponent_losses: None,
            poll_throttle: Throttle::new(config.poll_interval),
            push_throttle: Throttle::new(config.push_interval),
            config,
            outbox: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn phase(&self) -> RoomState {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn match_wins(&self) -> u32 {
        self.match_wins
    }

    pub fn opponent(&self) -> &OpponentView {
        &self.opponent
    }

    pub fn accounting(&self) -> &AttackAccounting {
        &self.accounting
    }

    /// Seconds left on the countdown, None outside of it
    pub fn countdown_remaining(&self, now: f64) -> Option<f64> {
        (self.phase == RoomState::Countdown).then(|| {
            (self.config.countdown.as_secs_f64() - (now - self.countdown_start)).max(0.0)
        })
    }

    pub fn take_outbox(&mut self) -> Vec<SyncRequest> {
        std::mem::take(&mut self.outbox)
    }

    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Garbage owed to the local board. Only handed out while playing.
    pub fn take_pending_garbage(&mut self) -> usize {
        if self.phase == RoomState::Playing {
            self.accounting.take_pending()
        } else {
            0
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn patch_self(&mut self, now: f64, patch: PlayerPatch) {
        let patch = PlayerPatch {
            last_seen: Some(now),
            seq: Some(self.next_seq()),
            ..patch
        };
        self.outbox.push(SyncRequest::PatchPlayer(self.slot, patch));
    }

    fn patch_room(&mut self, patch: RoomPatch) {
        self.outbox.push(SyncRequest::PatchRoom(patch));
    }

    /// Toggle readiness in the lobby
    pub fn set_ready(&mut self, ready: bool, now: f64) {
        if self.phase != RoomState::Waiting || self.ready == ready {
            return;
        }
        self.ready = ready;
        info!("{} ready = {}", self.slot, ready);
        self.patch_self(
            now,
            PlayerPatch {
                ready: Some(ready),
                ..PlayerPatch::default()
            },
        );
    }

    /// Count cleared lines as attack
    pub fn on_lines_cleared(&mut self, lines: usize) {
        if self.phase == RoomState::Playing && lines > 0 {
            let total = self.accounting.record_sent(lines);
            debug!("sent {} attack lines, total {}", lines, total);
        }
    }

    /// A stomp sends one attack line
    pub fn on_stomp(&mut self) {
        self.on_lines_cleared(1);
    }

    /// The local player lost the round
    pub fn on_loss(&mut self, now: f64) {
        if self.phase != RoomState::Playing {
            return;
        }
        self.losses += 1;
        info!("{} lost the round ({} losses)", self.slot, self.losses);
        self.end_round(now);
        self.patch_self(
            now,
            PlayerPatch {
                losses: Some(self.losses),
                ..PlayerPatch::default()
            },
        );
        if self.slot.is_host() {
            self.patch_room(RoomPatch {
                state: Some(RoomState::Waiting),
                countdown_start: None,
                last_update: Some(now),
            });
        } else {
            self.awaiting_waiting = true;
            self.lost_at = now;
        }
    }

    /// Back to the lobby: not ready, no stale garbage
    fn end_round(&mut self, now: f64) {
        self.phase = RoomState::Waiting;
        self.ready = false;
        self.accounting.clear_pending();
        self.events.push(SessionEvent::RoundEnded);
        self.patch_self(
            now,
            PlayerPatch {
                ready: Some(false),
                ..PlayerPatch::default()
            },
        );
    }

    fn start_countdown(&mut self, now: f64) {
        info!("{} countdown started", self.slot);
        self.phase = RoomState::Countdown;
        self.countdown_start = now;
        self.events.push(SessionEvent::CountdownStarted);
    }

    fn start_round(&mut self) {
        info!("{} round started", self.slot);
        self.phase = RoomState::Playing;
        self.accounting.clear_pending();
        self.events.push(SessionEvent::RoundStarted);
    }

    /// Apply a poll result
    pub fn on_room(&mut self, room: &BattleRoom, now: f64) {
        self.observe_opponent(room.player(self.slot.other()), now);

        if self.slot.is_host() {
            if self.phase == RoomState::Waiting && self.ready && self.opponent.ready {
                self.start_countdown(now);
                self.patch_room(RoomPatch {
                    state: Some(RoomState::Countdown),
                    countdown_start: Some(now),
                    last_update: Some(now),
                });
            }
            return;
        }

        if self.awaiting_waiting
            && matches!(room.state, RoomState::Countdown | RoomState::Playing)
            && room.countdown_start > self.lost_at
        {
            info!("{} host already started the next round", self.slot);
            self.awaiting_waiting = false;
        }

        match (room.state, self.phase) {
            (RoomState::Waiting, RoomState::Playing) => {
                info!("{} host ended the round", self.slot);
                self.end_round(now);
            }
            (RoomState::Waiting, RoomState::Countdown) => {
                self.phase = RoomState::Waiting;
            }
            (RoomState::Waiting, RoomState::Waiting) => {
                self.awaiting_waiting = false;
            }
            (RoomState::Countdown, RoomState::Waiting) if !self.awaiting_waiting => {
                self.start_countdown(now);
            }
            (RoomState::Playing, RoomState::Waiting | RoomState::Countdown) if !self.awaiting_waiting => {
                self.start_round();
            }
            _ => {}
        }
    }

    fn observe_opponent(&mut self, record: Option<&PlayerRecord>, now: f64) {
        let Some(record) = record else {
            self.opponent.present = false;
            self.opponent.ready = false;
            return;
        };

        if record.seq < self.opponent_seq {
            debug!(
                "ignoring stale opponent record (seq {} < {})",
                record.seq, self.opponent_seq
            );
            return;
        }
        self.opponent_seq = record.seq;

        self.opponent.present = true;
        self.opponent.ready = record.ready;
        self.opponent.score = record.score;
        self.opponent.stomps = record.stomps;
        self.opponent.match_wins = record.match_wins;
        self.opponent.losses = record.losses;
        match decode_board(&record.grid) {
            Ok(board) => self.opponent.board = board,
            Err(e) => warn!("bad opponent grid: {}", e),
        }

        let added = self.accounting.observe(record.attack_queue);
        if added > 0 {
            debug!("{} incoming garbage +{}", self.slot, added);
        }

        if self
            .opponent_losses
            .is_some_and(|previous| record.losses > previous)
        {
            self.match_wins += 1;
            info!("{} won the round ({} wins)", self.slot, self.match_wins);
            self.events.push(SessionEvent::Won);
            self.patch_self(
                now,
                PlayerPatch {
                    match_wins: Some(self.match_wins),
                    ..PlayerPatch::default()
                },
            );
            if self.slot.is_host() && self.phase != RoomState::Waiting {
                self.end_round(now);
                self.patch_room(RoomPatch {
                    state: Some(RoomState::Waiting),
                    countdown_start: None,
                    last_update: Some(now),
                });
            }
        }
        self.opponent_losses = Some(record.losses);
    }

    /// Advance timers and queue periodic traffic
    pub fn tick(&mut self, now: f64, game: &Game) {
        if self.phase == RoomState::Countdown
            && now - self.countdown_start >= self.config.countdown.as_secs_f64()
        {
            self.start_round();
            if self.slot.is_host() {
                self.patch_room(RoomPatch {
                    state: Some(RoomState::Playing),
                    countdown_start: None,
                    last_update: Some(now),
                });
            }
        }

        if self.poll_throttle.ready(now) {
            self.outbox.push(SyncRequest::Poll);
            if self.slot.is_host() {
                self.patch_room(RoomPatch {
                    last_update: Some(now),
                    ..RoomPatch::default()
                });
            }
        }

        if self.push_throttle.ready(now) {
            self.push_state(now, &game.board_with_piece(), &game.score);
        }
    }

    fn push_state(&mut self, now: f64, board: &Board, score: &Score) {
        self.patch_self(
            now,
            PlayerPatch {
                grid: Some(encode_board(board)),
                attack_queue: Some(self.accounting.lines_sent_total()),
                score: Some(score.points),
                stomps: Some(score.stomps),
                ..PlayerPatch::default()
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BOARD_HEIGHT, BOARD_WIDTH, Cell};
    use crate::game::GameConfig;
    use crate::sync::{SyncEvent, perform};
    use crate::transport::MemoryTransport;

    const STALE: Duration = Duration::from_secs(3600);

    struct Client {
        session: BattleSession,
        game: Game,
    }

    impl Client {
        fn new(slot: Slot, seed: u64) -> Self {
            Self {
                session: BattleSession::new(slot, SessionConfig::default(), 100.0),
                game: Game::new(
                    seed,
                    GameConfig {
                        walkers_enabled: false,
                        ..GameConfig::default()
                    },
                ),
            }
        }

        /// One loop iteration: tick, flush writes, poll, apply
        async fn step(&mut self, transport: &MemoryTransport, now: f64) -> Vec<SessionEvent> {
            self.session.tick(now, &self.game);
            self.flush(transport, now).await;
            self.session.take_events()
        }

        async fn flush(&mut self, transport: &MemoryTransport, now: f64) {
            for request in self.session.take_outbox() {
                match perform(transport, &request).await {
                    Ok(SyncEvent::Room(Some(room))) => self.session.on_room(&room, now),
                    Ok(_) => {}
                    Err(e) => panic!("request failed: {e}"),
                }
            }
            // Writes queued while applying a poll go out in the same step
            for request in self.session.take_outbox() {
                perform(transport, &request).await.unwrap();
            }
        }
    }

    async fn lobby(transport: &MemoryTransport) -> (Client, Client) {
        let p1 = join_room(transport, 100.0, STALE).await.unwrap();
        let p2 = join_room(transport, 100.5, STALE).await.unwrap();
        assert_eq!((p1, p2), (Slot::P1, Slot::P2));
        (Client::new(p1, 1), Client::new(p2, 2))
    }

    /// Run both clients every 100ms from `start` until `end`
    async fn run(
        transport: &MemoryTransport,
        host: &mut Client,
        guest: &mut Client,
        start: f64,
        end: f64,
    ) -> (Vec<SessionEvent>, Vec<SessionEvent>) {
        let mut host_events = Vec::new();
        let mut guest_events = Vec::new();
        let mut now = start;
        while now <= end {
            host_events.extend(host.step(transport, now).await);
            guest_events.extend(guest.step(transport, now).await);
            now += 0.1;
        }
        (host_events, guest_events)
    }

    async fn start_match(transport: &MemoryTransport) -> (Client, Client, f64) {
        let (mut host, mut guest) = lobby(transport).await;
        host.session.set_ready(true, 101.0);
        guest.session.set_ready(true, 101.0);
        run(transport, &mut host, &mut guest, 101.0, 106.0).await;
        assert_eq!(host.session.phase(), RoomState::Playing);
        assert_eq!(guest.session.phase(), RoomState::Playing);
        (host, guest, 106.1)
    }

    #[test]
    fn test_choose_slot() {
        assert_eq!(choose_slot(None, 0.0, 60.0).unwrap(), Claim::Create);

        let mut room = BattleRoom::hosted(100.0);
        assert_eq!(choose_slot(Some(&room), 110.0, 60.0).unwrap(), Claim::Guest);

        room.p2 = Some(PlayerRecord::joined(105.0));
        assert!(matches!(
            choose_slot(Some(&room), 110.0, 60.0),
            Err(JoinError::RoomFull)
        ));

        // Host went quiet but the room is still alive
        room.last_update = 200.0;
        room.p2 = Some(PlayerRecord::joined(200.0));
        assert_eq!(choose_slot(Some(&room), 210.0, 60.0).unwrap(), Claim::Host);

        // Nobody touched the room for too long
        assert_eq!(choose_slot(Some(&room), 300.0, 60.0).unwrap(), Claim::Create);
    }

    #[tokio::test]
    async fn test_third_player_gets_room_full() {
        let transport = MemoryTransport::new();
        lobby(&transport).await;
        let third = join_room(&transport, 101.0, STALE).await;
        assert!(matches!(third, Err(JoinError::RoomFull)));
    }

    #[tokio::test]
    async fn test_stale_room_is_reclaimed() {
        let transport = MemoryTransport::new();
        lobby(&transport).await;
        let later = 100.0 + STALE.as_secs_f64() + 1.0;
        assert_eq!(join_room(&transport, later, STALE).await.unwrap(), Slot::P1);
        let room = transport.snapshot().unwrap();
        assert!(room.p2.is_none());
        assert_eq!(room.last_update, later);
    }

    #[tokio::test]
    async fn test_lobby_countdown_playing() {
        let transport = MemoryTransport::new();
        let (mut host, mut guest) = lobby(&transport).await;

        // Nobody ready: nothing happens
        run(&transport, &mut host, &mut guest, 101.0, 102.0).await;
        assert_eq!(transport.snapshot().unwrap().state, RoomState::Waiting);

        host.session.set_ready(true, 102.1);
        guest.session.set_ready(true, 102.1);
        let (host_events, guest_events) = run(&transport, &mut host, &mut guest, 102.1, 103.0).await;
        assert!(host_events.contains(&SessionEvent::CountdownStarted));
        assert!(guest_events.contains(&SessionEvent::CountdownStarted));
        let room = transport.snapshot().unwrap();
        assert_eq!(room.state, RoomState::Countdown);
        let started = room.countdown_start;
        assert!(host.session.countdown_remaining(103.0).is_some());

        let (host_events, guest_events) = run(&transport, &mut host, &mut guest, 103.1, started + 3.8).await;
        assert_eq!(host_events, vec![SessionEvent::RoundStarted]);
        assert_eq!(guest_events, vec![SessionEvent::RoundStarted]);
        assert_eq!(transport.snapshot().unwrap().state, RoomState::Playing);
        assert_eq!(host.session.phase(), RoomState::Playing);
        assert_eq!(guest.session.phase(), RoomState::Playing);
    }

    #[tokio::test]
    async fn test_guest_falls_back_to_local_countdown() {
        let transport = MemoryTransport::new();
        let (mut host, mut guest) = lobby(&transport).await;
        host.session.set_ready(true, 101.0);
        guest.session.set_ready(true, 101.0);
        run(&transport, &mut host, &mut guest, 101.0, 102.0).await;
        assert_eq!(guest.session.phase(), RoomState::Countdown);

        // The host disappears before it can write `playing`
        let mut events = Vec::new();
        let mut now = 102.1;
        while now < 106.0 {
            events.extend(guest.step(&transport, now).await);
            now += 0.1;
        }
        assert_eq!(events, vec![SessionEvent::RoundStarted]);
        assert_eq!(transport.snapshot().unwrap().state, RoomState::Countdown);
    }

    #[tokio::test]
    async fn test_garbage_reaches_opponent() {
        let transport = MemoryTransport::new();
        let (mut host, mut guest, now) = start_match(&transport).await;

        host.session.on_lines_cleared(2);
        run(&transport, &mut host, &mut guest, now, now + 1.5).await;
        assert_eq!(guest.session.accounting().pending_garbage(), 2);

        // More polls of the same counter add nothing
        run(&transport, &mut host, &mut guest, now + 1.6, now + 3.0).await;
        let lines = guest.session.take_pending_garbage();
        assert_eq!(lines, 2);
        assert_eq!(guest.session.take_pending_garbage(), 0);
        assert_eq!(host.session.accounting().pending_garbage(), 0);

        let before = guest.game.board.clone();
        guest.game.apply_garbage(lines);
        let bottom = BOARD_HEIGHT - lines;
        for y in bottom..BOARD_HEIGHT {
            let empty = (0..BOARD_WIDTH)
                .filter(|&x| guest.game.board.get(x as i32, y as i32) == Some(Cell::Empty))
                .count();
            assert_eq!(empty, 1);
        }
        for y in 0..bottom {
            for x in 0..BOARD_WIDTH as i32 {
                assert_eq!(
                    guest.game.board.get(x, y as i32),
                    before.get(x, (y + lines) as i32)
                );
            }
        }
    }

    #[tokio::test]
    async fn test_stomp_sends_one_line() {
        let transport = MemoryTransport::new();
        let (mut host, mut guest, now) = start_match(&transport).await;
        guest.session.on_stomp();
        run(&transport, &mut host, &mut guest, now, now + 1.5).await;
        assert_eq!(host.session.take_pending_garbage(), 1);
    }

    #[tokio::test]
    async fn test_opponent_board_is_mirrored() {
        let transport = MemoryTransport::new();
        let (mut host, mut guest, now) = start_match(&transport).await;
        host.game.process_action(crate::game::Action::HardDrop);
        run(&transport, &mut host, &mut guest, now, now + 1.5).await;
        assert_eq!(guest.session.opponent().board, host.game.board_with_piece());
        assert!(guest.session.opponent().present);
    }

    #[tokio::test]
    async fn test_guest_loss_returns_both_to_lobby() {
        let transport = MemoryTransport::new();
        let (mut host, mut guest, now) = start_match(&transport).await;

        guest.session.on_loss(now);
        assert_eq!(guest.session.take_events(), vec![SessionEvent::RoundEnded]);
        let (host_events, guest_events) = run(&transport, &mut host, &mut guest, now, now + 2.0).await;

        assert_eq!(host_events, vec![SessionEvent::Won, SessionEvent::RoundEnded]);
        assert!(guest_events.is_empty());
        assert_eq!(host.session.match_wins(), 1);
        assert_eq!(guest.session.match_wins(), 0);
        assert_eq!(host.session.phase(), RoomState::Waiting);
        assert_eq!(guest.session.phase(), RoomState::Waiting);

        let room = transport.snapshot().unwrap();
        assert_eq!(room.state, RoomState::Waiting);
        let p1 = room.p1.unwrap();
        let p2 = room.p2.unwrap();
        assert_eq!(p1.match_wins, 1);
        assert_eq!(p2.losses, 1);
        assert!(!p1.ready);
        assert!(!p2.ready);

        // The next round starts cleanly
        host.session.set_ready(true, now + 2.1);
        guest.session.set_ready(true, now + 2.1);
        run(&transport, &mut host, &mut guest, now + 2.1, now + 7.0).await;
        assert_eq!(host.session.phase(), RoomState::Playing);
        assert_eq!(guest.session.phase(), RoomState::Playing);
    }

    #[tokio::test]
    async fn test_guest_follows_next_round_without_seeing_waiting() {
        let transport = MemoryTransport::new();
        let (mut host, mut guest, now) = start_match(&transport).await;

        // The guest loses and readies again; only its writes go out
        guest.session.on_loss(now);
        guest.session.set_ready(true, now);
        for request in guest.session.take_outbox() {
            perform(&transport, &request).await.unwrap();
        }
        guest.session.take_events();

        // The host sees the loss, readies and starts the next countdown
        // before the guest polls again
        host.step(&transport, now + 0.8).await;
        assert_eq!(host.session.phase(), RoomState::Waiting);
        host.session.set_ready(true, now + 0.8);
        host.step(&transport, now + 1.6).await;
        assert_eq!(host.session.phase(), RoomState::Countdown);
        assert_eq!(transport.snapshot().unwrap().state, RoomState::Countdown);

        let (_, guest_events) = run(&transport, &mut host, &mut guest, now + 1.7, now + 8.0).await;
        assert!(guest_events.contains(&SessionEvent::RoundStarted));
        assert_eq!(host.session.phase(), RoomState::Playing);
        assert_eq!(guest.session.phase(), RoomState::Playing);
        assert_eq!(transport.snapshot().unwrap().state, RoomState::Playing);
    }

    #[test]
    fn test_lost_guest_ignores_the_round_it_lost() {
        let mut session = BattleSession::new(Slot::P2, SessionConfig::default(), 0.0);
        let mut room = BattleRoom::hosted(0.0);
        room.p1.as_mut().unwrap().ready = true;
        room.state = RoomState::Playing;
        room.countdown_start = 5.0;
        session.on_room(&room, 9.0);
        assert_eq!(session.phase(), RoomState::Playing);

        session.on_loss(10.0);
        session.on_room(&room, 10.5);
        assert_eq!(session.phase(), RoomState::Waiting);

        room.state = RoomState::Countdown;
        room.countdown_start = 11.0;
        session.on_room(&room, 11.2);
        assert_eq!(session.phase(), RoomState::Countdown);
    }

    #[tokio::test]
    async fn test_host_loss_credits_guest() {
        let transport = MemoryTransport::new();
        let (mut host, mut guest, now) = start_match(&transport).await;

        host.session.on_loss(now);
        let (_, guest_events) = run(&transport, &mut host, &mut guest, now, now + 2.0).await;
        assert!(guest_events.contains(&SessionEvent::Won));
        assert!(guest_events.contains(&SessionEvent::RoundEnded));
        assert_eq!(guest.session.match_wins(), 1);
        assert_eq!(guest.session.phase(), RoomState::Waiting);
        assert_eq!(transport.snapshot().unwrap().p2.unwrap().match_wins, 1);
    }

    #[test]
    fn test_stale_opponent_record_is_ignored() {
        let mut session = BattleSession::new(Slot::P1, SessionConfig::default(), 0.0);
        let mut room = BattleRoom::hosted(0.0);
        room.p2 = Some(PlayerRecord {
            seq: 5,
            score: 3000,
            ..PlayerRecord::default()
        });
        session.on_room(&room, 1.0);
        assert_eq!(session.opponent().score, 3000);

        room.p2 = Some(PlayerRecord {
            seq: 4,
            score: 1000,
            ..PlayerRecord::default()
        });
        session.on_room(&room, 2.0);
        assert_eq!(session.opponent().score, 3000);
    }

    #[test]
    fn test_garbage_is_withheld_outside_play() {
        let mut session = BattleSession::new(Slot::P2, SessionConfig::default(), 0.0);
        let mut room = BattleRoom::hosted(0.0);
        room.p1.as_mut().unwrap().seq = 1;
        session.on_room(&room, 1.0);
        room.p1.as_mut().unwrap().attack_queue = 4;
        room.p1.as_mut().unwrap().seq = 2;
        session.on_room(&room, 2.0);
        assert_eq!(session.accounting().pending_garbage(), 4);
        assert_eq!(session.take_pending_garbage(), 0);
    }
}
