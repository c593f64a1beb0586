//! Device operations and linking workflows.
//!
//! The [`Hub`] is the session object handed to every front-end command. It
//! owns the [`Messenger`], which owns the [`Bridge`].

use std::time::Duration;

use crate::bridge::Bridge;
use crate::error::{Error, Result};
use crate::event::{MessageFilter, PendingMatch, Subscription};
use crate::messenger::Messenger;
use crate::products;
use crate::protocol::{Command, Frame, Payload};
use crate::rates::rate_for_duration;
use crate::types::{
    Address, AllLinkCompleted, AllLinkRecord, DeviceIdentity, InsteonMessage, LinkRecord,
    LinkResult, LinkingMode, OutboundMessage, commands,
};

/// Default timeout for device workflows.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Options for [`Hub::link`] and [`Hub::unlink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
    /// Bridge role. Required when linking a specific device.
    pub controller: Option<bool>,
    /// All-link group, greater than 0.
    pub group: u8,
    /// How long to wait for the link to complete.
    pub timeout: Duration,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            controller: None,
            group: 1,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl LinkOptions {
    /// Sets the bridge role.
    #[must_use]
    pub const fn controller(mut self, controller: bool) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Sets the group.
    #[must_use]
    pub const fn group(mut self, group: u8) -> Self {
        self.group = group;
        self
    }

    /// Sets the completion timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Options for [`Hub::turn_on`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnOn {
    /// Target level in percent, 0..=100.
    pub level: u8,
    /// Skip the ramp. Only valid at full level without a duration.
    pub fast: bool,
    /// Ramp duration.
    pub duration: Option<Duration>,
}

impl Default for TurnOn {
    fn default() -> Self {
        Self {
            level: 100,
            fast: false,
            duration: None,
        }
    }
}

impl TurnOn {
    /// Sets the level.
    #[must_use]
    pub const fn level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    /// Turns on instantly.
    #[must_use]
    pub const fn fast(mut self) -> Self {
        self.fast = true;
        self
    }

    /// Ramps over `duration`.
    #[must_use]
    pub const fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Options for [`Hub::turn_off`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnOff {
    /// Skip the ramp. Exclusive with `duration`.
    pub fast: bool,
    /// Ramp duration.
    pub duration: Option<Duration>,
}

impl TurnOff {
    /// Turns off instantly.
    #[must_use]
    pub const fn fast(mut self) -> Self {
        self.fast = true;
        self
    }

    /// Ramps over `duration`.
    #[must_use]
    pub const fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Result of [`Hub::links`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Links {
    /// The bridge's own link database.
    Bridge(Vec<AllLinkRecord>),
    /// A device's link database.
    Device(Vec<LinkRecord>),
}

impl Links {
    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Bridge(records) => records.len(),
            Self::Device(records) => records.len(),
        }
    }

    /// True if there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// High-level device operations.
#[derive(Clone)]
pub struct Hub {
    messenger: Messenger,
}

impl Hub {
    /// Opens the modem on a serial port with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be opened.
    pub async fn open(path: &str) -> Result<Self> {
        Ok(Self::new(Messenger::open(path).await?))
    }

    /// Creates a hub over a messenger.
    #[must_use]
    pub const fn new(messenger: Messenger) -> Self {
        Self { messenger }
    }

    /// Returns the messenger.
    #[must_use]
    pub const fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    /// Returns the bridge.
    #[must_use]
    pub fn bridge(&self) -> &Bridge {
        self.messenger.bridge()
    }

    /// Closes the link to the modem.
    ///
    /// # Errors
    ///
    /// Returns an error if shutting down the stream fails.
    pub async fn close(&self) -> Result<()> {
        self.messenger.close().await
    }

    /// Subscribes to every received message.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<InsteonMessage> {
        self.messenger.subscribe()
    }

    /// Requests a device's status and returns its on-level.
    pub async fn status(&self, address: Address, cmd2: u8) -> Result<u8> {
        let reply = self
            .messenger
            .send(OutboundMessage::new(address, commands::STATUS_REQUEST).cmd2(cmd2))
            .await?;
        Ok(reply.cmd2)
    }

    /// Pings a device.
    pub async fn ping(&self, address: Address) -> Result<()> {
        self.messenger
            .send(OutboundMessage::new(address, commands::PING))
            .await?;
        Ok(())
    }

    /// Asks a device to identify itself.
    ///
    /// The device acknowledges, then broadcasts its category, subcategory and
    /// firmware version in place of the destination address.
    pub async fn product_info(&self, address: Address, timeout: Duration) -> Result<DeviceIdentity> {
        check_timeout(timeout)?;

        let broadcast = self
            .messenger
            .match_message(MessageFilter::sender(address).broadcast(true), timeout);
        self.messenger
            .send(OutboundMessage::new(address, commands::ID_REQUEST))
            .await?;
        let reply = broadcast.wait().await?;

        let [category, subcategory, firmware_version] = *reply.to.as_bytes();
        Ok(DeviceIdentity {
            category,
            subcategory,
            firmware_version,
            product: products::lookup(category, subcategory),
        })
    }

    /// Links a device with the bridge.
    ///
    /// With an address the device is put into linking mode remotely and
    /// `controller` must be set; without one, press the device's set button
    /// within the timeout. Linking mode is always exited afterwards.
    pub async fn link(&self, address: Option<Address>, options: LinkOptions) -> Result<LinkResult> {
        if address.is_some() && options.controller.is_none() {
            return Err(Error::validation(
                "controller must be specified when linking a device",
            ));
        }
        check_group(options.group)?;
        check_timeout(options.timeout)?;

        let mode = LinkingMode {
            controller: options.controller,
            remove: false,
            group: options.group,
        };
        let link = self.run_linking(address, mode, options.timeout).await?;
        tracing::info!(address = %link.address, group = link.group, "linked");

        Ok(LinkResult {
            product: products::lookup(link.category, link.subcategory),
            link,
        })
    }

    /// Removes a link between a device and the bridge.
    pub async fn unlink(
        &self,
        address: Option<Address>,
        options: LinkOptions,
    ) -> Result<AllLinkCompleted> {
        check_group(options.group)?;
        check_timeout(options.timeout)?;

        let link = self
            .run_linking(address, LinkingMode::remove(options.group), options.timeout)
            .await?;
        tracing::info!(address = %link.address, group = link.group, "unlinked");
        Ok(link)
    }

    async fn run_linking(
        &self,
        address: Option<Address>,
        mode: LinkingMode,
        timeout: Duration,
    ) -> Result<AllLinkCompleted> {
        let bridge = self.bridge();
        bridge.cancel_all_linking().await?;

        let completed = bridge.match_frame(Command::AllLinkingCompleted, timeout);
        let result = self.await_linking(address, mode, completed).await;
        self.finish_linking(address).await;

        let frame = result?;
        match frame.payload {
            Payload::AllLinkingCompleted(link) => Ok(link),
            _ => Err(Error::UnexpectedPayload {
                command: frame.command,
            }),
        }
    }

    async fn await_linking(
        &self,
        address: Option<Address>,
        mode: LinkingMode,
        completed: PendingMatch<Frame>,
    ) -> Result<Frame> {
        self.bridge().start_all_linking(mode).await?;

        if let Some(address) = address {
            self.messenger
                .send(
                    OutboundMessage::new(address, commands::ENTER_LINKING)
                        .cmd2(mode.group)
                        .extended(),
                )
                .await?;
        }

        completed.wait().await
    }

    async fn finish_linking(&self, address: Option<Address>) {
        if let Err(e) = self.bridge().cancel_all_linking().await {
            tracing::warn!("failed to cancel linking: {}", e);
        }

        if let Some(address) = address {
            let exit = OutboundMessage::new(address, commands::EXIT_LINKING).extended();
            if let Err(e) = self.messenger.send(exit).await {
                tracing::warn!(%address, "failed to exit linking: {}", e);
            }
        }
    }

    /// Reads a link database: the bridge's without an address, otherwise the
    /// device's.
    ///
    /// A device streams one record per extended reply and ends with a record
    /// in group 0. The listing is bounded only by `timeout` per record.
    pub async fn links(&self, address: Option<Address>, timeout: Duration) -> Result<Links> {
        check_timeout(timeout)?;

        let Some(address) = address else {
            return self.bridge().all_link_database().await.map(Links::Bridge);
        };

        let mut replies = self.messenger.subscribe();
        self.messenger
            .send_with(
                OutboundMessage::new(address, commands::READ_WRITE_LINKS).extended(),
                timeout,
            )
            .await?;

        let filter = MessageFilter::sender(address)
            .cmd1(commands::READ_WRITE_LINKS)
            .extended(true);
        let mut records = Vec::new();

        loop {
            let message = tokio::time::timeout(timeout, next_matching(&mut replies, &filter))
                .await
                .map_err(|_| Error::timeout(timeout))??;
            let Some(userdata) = message.userdata else {
                continue;
            };

            let record = LinkRecord::from_userdata(&userdata)?;
            if record.is_end() {
                break;
            }
            tracing::debug!(?record, "link record");
            records.push(record);
        }

        Ok(Links::Device(records))
    }

    /// Turns a device on.
    pub async fn turn_on(&self, address: Address, options: TurnOn) -> Result<()> {
        if options.level > 100 {
            return Err(Error::validation("level must be between 0 and 100"));
        }
        if let Some(duration) = options.duration {
            check_duration(duration)?;
        }
        if options.fast && (options.duration.is_some() || options.level < 100) {
            return Err(Error::validation(
                "fast cannot be combined with a duration or a partial level",
            ));
        }

        let level = u32::from(options.level);
        let message = match options.duration {
            None => {
                let cmd1 = if options.fast {
                    commands::ON_FAST
                } else {
                    commands::ON
                };
                OutboundMessage::new(address, cmd1).cmd2(scale(level, 255))
            }
            // Level in the high nibble, ramp rate in the low nibble.
            Some(duration) => OutboundMessage::new(address, commands::ON_WITH_RATE)
                .cmd2((scale(level, 15) << 4) | rate_for_duration(duration)),
        };

        self.messenger.send(message).await?;
        Ok(())
    }

    /// Turns a device off.
    pub async fn turn_off(&self, address: Address, options: TurnOff) -> Result<()> {
        if let Some(duration) = options.duration {
            check_duration(duration)?;
            if options.fast {
                return Err(Error::validation("fast cannot be combined with a duration"));
            }
        }

        let message = match options.duration {
            None => {
                let cmd1 = if options.fast {
                    commands::OFF_FAST
                } else {
                    commands::OFF
                };
                OutboundMessage::new(address, cmd1)
            }
            Some(duration) => OutboundMessage::new(address, commands::OFF_WITH_RATE)
                .cmd2(rate_for_duration(duration)),
        };

        self.messenger.send(message).await?;
        Ok(())
    }
}

async fn next_matching(
    replies: &mut Subscription<InsteonMessage>,
    filter: &MessageFilter,
) -> Result<InsteonMessage> {
    loop {
        let message = replies.recv().await.ok_or(Error::ChannelClosed)?;
        if filter.matches(&message) {
            return Ok(message);
        }
    }
}

/// Scales a percentage to `0..=max`, rounding half up.
fn scale(percent: u32, max: u32) -> u8 {
    u8::try_from((percent * max + 50) / 100).unwrap_or(u8::MAX)
}

fn check_group(group: u8) -> Result<()> {
    if group == 0 {
        return Err(Error::validation("group must be greater than 0"));
    }
    Ok(())
}

fn check_timeout(timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(Error::validation("timeout must be greater than 0"));
    }
    Ok(())
}

fn check_duration(duration: Duration) -> Result<()> {
    if duration.is_zero() {
        return Err(Error::validation("duration must be greater than 0"));
    }
    Ok(())
}
