#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose argument is a list of (possibly quoted) file paths.
pub(crate) const MULTI_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "add",
    action: "add_images",
}];

/// Commands whose argument is a single asset identifier.
pub(crate) const ID_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "remove",
        action: "remove_image",
    },
    CommandSpec {
        command: "up",
        action: "move_up",
    },
    CommandSpec {
        command: "down",
        action: "move_down",
    },
];

/// Commands whose argument is passed through verbatim.
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "untag",
        action: "remove_tag",
    },
    CommandSpec {
        command: "model",
        action: "set_model",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "tags",
        action: "list_tags",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "analyze",
        action: "analyze",
    },
    CommandSpec {
        command: "reset",
        action: "reset",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/add",
    "/remove",
    "/up",
    "/down",
    "/untag",
    "/tags",
    "/status",
    "/analyze",
    "/reset",
    "/model",
    "/help",
    "/quit",
];
