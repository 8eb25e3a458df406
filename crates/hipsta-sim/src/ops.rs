use rand::Rng;
use rand_chacha::ChaCha8Rng;

const TAGS: &[&str] = &["news", "Read Later", "rust", "Recipes"];
const HOSTS: &[&str] = &["example.com", "rust-lang.org", "news.example", "blog.example"];

/// One simulated action.
///
/// `slot` picks a record among those present when the step runs, modulo
/// their count. `Remote*` operations change the remote service directly,
/// as another device would.
#[derive(Debug, Clone)]
pub enum Op {
    Create { url: String, tags: Vec<String> },
    Read { slot: usize },
    SetArchived { slot: usize, archived: bool },
    ToggleTag { slot: usize, tag: String },
    Delete { slot: usize },
    Sync,
    RemoteEdit { slot: usize, url: String },
    RemoteCreate { url: String },
    RemoteDelete { slot: usize },
}

impl Op {
    pub fn is_remote_side(&self) -> bool {
        matches!(
            self,
            Op::RemoteEdit { .. } | Op::RemoteCreate { .. } | Op::RemoteDelete { .. }
        )
    }
}

pub fn random_url(rng: &mut ChaCha8Rng) -> String {
    let host = HOSTS[rng.gen_range(0..HOSTS.len())];
    format!("https://{}/{}", host, rng.gen::<u16>())
}

fn random_tag(rng: &mut ChaCha8Rng) -> String {
    TAGS[rng.gen_range(0..TAGS.len())].to_string()
}

pub fn generate(rng: &mut ChaCha8Rng) -> Op {
    let slot = rng.gen::<u16>() as usize;
    match rng.gen_range(0..16) {
        0..=3 => {
            let count = rng.gen_range(0..=2);
            Op::Create {
                url: random_url(rng),
                tags: (0..count).map(|_| random_tag(rng)).collect(),
            }
        }
        4 | 5 => Op::Read { slot },
        6 | 7 => Op::SetArchived {
            slot,
            archived: rng.gen_bool(0.5),
        },
        8 | 9 => Op::ToggleTag {
            slot,
            tag: random_tag(rng),
        },
        10 => Op::Delete { slot },
        11 | 12 => Op::Sync,
        13 => Op::RemoteEdit {
            slot,
            url: random_url(rng),
        },
        14 => Op::RemoteCreate {
            url: random_url(rng),
        },
        _ => Op::RemoteDelete { slot },
    }
}
