use std::fmt::{Debug, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::util::normalize::normalize;


/// Who may contact the local identity
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PermitMode {
    PermitAll = 1,
    DenyAll = 2,
    PermitSome = 3,
    DenySome = 4,
    PermitBuddies = 5,
}
impl Default for PermitMode {
    fn default() -> Self {
        PermitMode::PermitAll
    }
}


#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Buddy {
    /// as it was first seen, e.g. "Bob Smith"
    pub screen_name: String,
    pub alias: Option<String>,
    pub group: Option<String>,
    pub online: bool,
    pub away: bool,
    /// warning level in percent
    pub warning: u32,
    /// seconds since the epoch, 0 if unknown
    pub signon_time: u64,
    pub idle_minutes: u32,
    pub user_class: String,
}
impl Buddy {
    pub fn new(screen_name: &str) -> Buddy {
        Buddy {
            screen_name: screen_name.trim().to_string(),
            ..Default::default()
        }
    }

    pub fn normalized(&self) -> String {
        normalize(&self.screen_name)
    }
}


#[derive(Default)]
pub struct BuddyList {
    groups: Vec<String>,
    buddies: FxHashMap<String, Buddy>,
    permit: Vec<String>,
    deny: Vec<String>,
    permit_mode: PermitMode,
}
impl Debug for BuddyList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "BuddyList{{groups:{}, buddies:{}, mode:{:?}}}", self.groups.len(), self.buddies.len(), self.permit_mode)
    }
}

impl BuddyList {
    pub fn new() -> BuddyList {
        Default::default()
    }

    pub fn get(&self, screen_name: &str) -> Option<&Buddy> {
        self.buddies.get(&normalize(screen_name))
    }

    pub fn get_mut(&mut self, screen_name: &str) -> Option<&mut Buddy> {
        self.buddies.get_mut(&normalize(screen_name))
    }

    pub fn contains(&self, screen_name: &str) -> bool {
        self.buddies.contains_key(&normalize(screen_name))
    }

    pub fn get_or_create(&mut self, screen_name: &str) -> &mut Buddy {
        self.buddies.entry(normalize(screen_name))
            .or_insert_with(|| Buddy::new(screen_name))
    }

    /// Adds a buddy to a group, creating both if necessary. A buddy is a member of one group at a time.
    pub fn add_to_group(&mut self, screen_name: &str, group: &str) -> &mut Buddy {
        self.add_group(group);
        let buddy = self.get_or_create(screen_name);
        buddy.group = Some(group.to_string());
        buddy
    }

    pub fn add_group(&mut self, group: &str) {
        if !self.groups.iter().any(|g| g == group) {
            self.groups.push(group.to_string());
        }
    }

    pub fn remove(&mut self, screen_name: &str) -> Option<Buddy> {
        self.buddies.remove(&normalize(screen_name))
    }

    pub fn len(&self) -> usize {
        self.buddies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buddies.is_empty()
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn buddies(&self) -> impl Iterator<Item = &Buddy> {
        self.buddies.values()
    }

    pub fn members_of<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a Buddy> + 'a {
        self.buddies.values()
            .filter(move |b| b.group.as_deref() == Some(group))
    }

    pub fn permit_mode(&self) -> PermitMode {
        self.permit_mode
    }

    pub fn set_permit_mode(&mut self, mode: PermitMode) {
        self.permit_mode = mode;
    }

    pub fn permitted(&self) -> &[String] {
        &self.permit
    }

    pub fn denied(&self) -> &[String] {
        &self.deny
    }

    pub fn add_permit(&mut self, screen_name: &str) {
        add_unique(&mut self.permit, screen_name);
    }

    pub fn add_deny(&mut self, screen_name: &str) {
        add_unique(&mut self.deny, screen_name);
    }

    /// Applies the stored configuration the server sends after sign-on: one entry per line, `g:`
    ///  starts a group, `b:` adds a buddy (with an optional alias) to the current group, `p:` and
    ///  `d:` extend the permit / deny lists, `m:` sets the permit mode. `done:` ends the
    ///  configuration.
    ///
    /// Groups, permit / deny lists and the mode are replaced. Buddies that are known already keep
    ///  their presence state.
    pub fn apply_config(&mut self, config: &str) {
        self.groups.clear();
        self.permit.clear();
        self.deny.clear();
        self.permit_mode = PermitMode::default();

        let mut current_group: Option<String> = None;
        for line in config.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (tag, value) = match line.split_once(':') {
                Some(parts) => parts,
                None => {
                    debug!("skipping buddy list config line without a tag: {:?}", line);
                    continue;
                }
            };

            match tag {
                "g" => {
                    self.add_group(value);
                    current_group = Some(value.to_string());
                }
                "b" => {
                    let mut parts = value.split(':');
                    let screen_name = parts.next().unwrap_or("");
                    if normalize(screen_name).is_empty() {
                        continue;
                    }
                    let alias = parts.next()
                        .filter(|a| !a.is_empty())
                        .map(|a| a.to_string());

                    let buddy = self.get_or_create(screen_name);
                    buddy.group = current_group.clone();
                    if alias.is_some() {
                        buddy.alias = alias;
                    }
                }
                "p" => self.add_permit(value),
                "d" => self.add_deny(value),
                "m" => match value.trim().parse::<u8>().ok().and_then(|m| PermitMode::try_from(m).ok()) {
                    Some(mode) => self.permit_mode = mode,
                    None => warn!("ignoring invalid permit mode {:?}", value),
                },
                "done" => break,
                _ => debug!("skipping unknown buddy list config entry {:?}", line),
            }
        }
    }
}

fn add_unique(list: &mut Vec<String>, screen_name: &str) {
    let normalized = normalize(screen_name);
    if normalized.is_empty() {
        return;
    }
    if !list.iter().any(|s| normalize(s) == normalized) {
        list.push(screen_name.trim().to_string());
    }
}
