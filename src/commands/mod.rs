mod ask;
mod election;
mod vote;
mod voter;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::helpers::command_def::{CommandDef, InteractionHandler};
use crate::support::register_elections;

pub const COMMANDS: &[CommandDef] = &[
    CommandDef {
        name: election::ELECTION,
        builder: election::election_builder,
        handler: |c, i| Box::pin(async move { election::election(c, i).await }),
        re_register: true,
    },
    CommandDef {
        name: voter::VOTER,
        builder: voter::voter_builder,
        handler: |c, i| Box::pin(async move { voter::voter(c, i).await }),
        re_register: true,
    },
    CommandDef {
        name: ask::ASK,
        builder: ask::ask_builder,
        handler: |c, i| Box::pin(async move { ask::ask(c, i).await }),
        re_register: false,
    },
];

/// Commands whose registration depends on the current elections; see `register_elections`.
const DYNAMIC_COMMANDS: &[(&str, InteractionHandler)] = &[
    (register_elections::COMMIT, |c, i| Box::pin(async move { vote::commit(c, i).await })),
    (register_elections::REVEAL, |c, i| Box::pin(async move { vote::reveal(c, i).await })),
];

static COMMAND_MAP: Lazy<DashMap<String, InteractionHandler>> = Lazy::new(|| {
    let map = DashMap::new();

    for cmd in COMMANDS {
        map.insert(cmd.name.to_string(), cmd.handler);
    }
    for (name, handler) in DYNAMIC_COMMANDS {
        map.insert(name.to_string(), *handler);
    }

    map
});

pub fn get_handler(command_name: &str) -> Option<InteractionHandler> {
    COMMAND_MAP
        .get(command_name)
        .as_ref()
        .map(|entry| *entry.value())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_command_has_a_handler() {
        for name in ["election", "voter", "ask", "commit", "reveal"] {
            assert!(get_handler(name).is_some(), "{}", name);
        }
        assert!(get_handler("unknown").is_none());
    }
}
